//! tire - raycast wheel helpers (contact kinematics, friction impulses, steering)

pub mod friction;
pub mod kinematics;
pub mod steering;

pub use friction::{WheelFriction, solve_friction};
pub use steering::steering_authority;
