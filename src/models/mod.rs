pub mod lithium_ion;

pub use lithium_ion::single_particle_model;
