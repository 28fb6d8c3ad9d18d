pub mod compositor;
pub mod draw;
pub mod layers;
pub mod scheduler;
pub mod surface;
pub mod text;
