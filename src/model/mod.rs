pub mod controller_user;
pub mod credential;
pub mod device;
pub mod event_message;
pub mod group;
pub mod people;

pub use controller_user::{ControllerUser, Permission, UserType};
pub use credential::{Credential, CredentialAccess, CredentialPatch, NewCredential};
pub use device::{ControllerProp, InterfaceBoard, RelayReply};
pub use event_message::EventMessage;
pub use group::{AccessGroup, Door, DoorGroup, SchedGroup, SchedWindow};
pub use people::{Department, People};
