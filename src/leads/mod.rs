//! Lead domain model.

pub mod model;

pub use model::{
    BusinessContext, ClassificationResult, Lead, LeadScore, LeadStatus, ReplyLength, ReplyTone,
    ScoreFactors, UserProfile, WritingStyle,
};
