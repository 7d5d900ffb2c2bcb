pub mod aggregate;
pub mod attendance;
pub mod ledger;
pub mod normalize;
pub mod role;
pub mod session;
