pub mod checker;

pub use checker::MembershipChecker;
