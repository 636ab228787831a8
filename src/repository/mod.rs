// 数据访问层：每个仓库持有 `Arc<Stores>`，只访问自己负责的存储

pub mod controller_user_repo;
pub mod credential_repo;
pub mod device_repo;
pub mod event_message_repo;
pub mod group_repo;
pub mod people_repo;

pub use controller_user_repo::ControllerUserRepository;
pub use credential_repo::CredentialRepository;
pub use device_repo::DeviceRepository;
pub use event_message_repo::EventMessageRepository;
pub use group_repo::GroupRepository;
pub use people_repo::{DepartmentRepository, PeopleRepository};
