pub mod analysis;
pub mod decode;
pub mod features;
pub mod filter;
pub mod interp;
pub mod timing;
pub mod track;
pub mod window;
