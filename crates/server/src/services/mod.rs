pub mod access;
pub mod activity;
pub mod invoice;
pub mod ledger;
pub mod lifecycle;
pub mod lyrics;
pub mod mailer;
pub mod storage;
pub mod survey;
