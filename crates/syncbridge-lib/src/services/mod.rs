// Services module
// Scheduling, connectors, pipeline, gateway and their collaborators

pub mod activity;
pub mod connectors;
pub mod crypto;
pub mod delivery;
pub mod incoming_webhook;
pub mod pipeline;
pub mod processors;
pub mod rate_limit;
pub mod scheduler;
pub mod verification;

pub use activity::ActivityLogger;
pub use crypto::{CredentialVault, CryptoError, EncryptedData};
pub use delivery::{DeliveryError, DeliverySink, HttpSink, LogSink};
pub use incoming_webhook::{gateway_router, GatewayServer, GatewayState};
pub use scheduler::{RunStatus, Scheduler, SchedulerSettings};
