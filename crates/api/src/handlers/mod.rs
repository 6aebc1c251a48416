pub(crate) use crate::AppState;

pub mod webhooks;
pub mod workflows;
