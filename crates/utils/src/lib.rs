mod build_info;
pub mod keyed_lock;
pub mod logging;
pub mod version;
