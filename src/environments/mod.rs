pub mod mountain_car;
pub mod pendulum;

pub use mountain_car::MountainCar;
pub use pendulum::Pendulum;
