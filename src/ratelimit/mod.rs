//! Rate limiting decision engine.

mod dispatcher;
mod limiter;
mod options;
mod quota;
mod request;
mod strategy;

pub use dispatcher::{Decision, Dispatcher};
pub use limiter::Limiter;
pub use options::{fnv1a_32, HashFn, KeyFn, Options, QuotaFn};
pub use quota::Quota;
pub use request::RequestHead;
pub use strategy::{BucketedKeyStrategy, GlobalStrategy, KeyStrategy, Strategy, StrategyKind};
