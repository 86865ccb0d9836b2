pub mod file_util;
pub mod path_util;
