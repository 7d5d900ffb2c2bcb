pub mod login;
pub mod logout;
pub mod mark_attendance;

pub use login::{LoginCommand, LoginHandler, LoginOutcome};
pub use logout::{LogoutCommand, LogoutHandler};
pub use mark_attendance::{MarkAttendanceCommand, MarkAttendanceHandler, MarkReceipt, StudentMark};
