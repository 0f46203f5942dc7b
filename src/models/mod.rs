mod audit_event;
mod payment_intent;
mod plan;
mod transaction;
mod user;
mod webhook_attempt;

pub use audit_event::*;
pub use payment_intent::*;
pub use plan::*;
pub use transaction::*;
pub use user::*;
pub use webhook_attempt::*;
