pub mod add;
pub mod backup;
pub mod common;
pub mod delete;
pub mod edit;
pub mod folder;
pub mod list;
pub mod media;
pub mod profile;
pub mod sync;
