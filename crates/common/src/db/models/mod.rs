//! SeaORM entity models
//!
//! Database entities for PeerDesk

mod paper;
mod paper_reviewer;
mod user;

pub use paper::{
    Entity as PaperEntity,
    Model as PaperRow,
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
};

pub use paper_reviewer::{
    Entity as PaperReviewerEntity,
    Model as PaperReviewerRow,
    ActiveModel as PaperReviewerActiveModel,
    Column as PaperReviewerColumn,
};

pub use user::{
    Entity as UserEntity,
    Model as UserRow,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
};
