// 业务服务层

pub mod access_resolver;
pub mod config_sync;
pub mod controller_user_service;
pub mod credential_service;
pub mod device_relay;
pub mod event_message_service;

pub use access_resolver::{AccessCheck, AccessDecision, AccessResolver, DenyReason};
pub use config_sync::ConfigSync;
pub use controller_user_service::ControllerUserService;
pub use credential_service::{CredentialService, PeopleService};
pub use device_relay::{DeviceRelay, OsClock, SystemClock};
pub use event_message_service::EventMessageService;
