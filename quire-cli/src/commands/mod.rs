pub mod preview;
pub mod serve;
pub mod site;
