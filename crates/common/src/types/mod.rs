mod analysis;
mod claim;
mod stage;

pub use analysis::*;
pub use claim::*;
pub use stage::*;
