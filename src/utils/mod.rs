pub mod byte_string;
pub mod io;

pub use self::byte_string::ByteString;
