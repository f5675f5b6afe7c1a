mod map;
mod object;
mod position;
mod town;

pub use map::*;
pub use object::*;
pub use position::*;
pub use town::*;
