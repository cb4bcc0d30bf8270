//! # Activation Functions Module
//!
//! The value networks only need two activations:
//!
//! - **ReLU**: `max(0, x)`, used between every hidden stage
//! - **Linear**: identity, used on the Q-value output layer so action values stay unbounded
//!
//! ```rust
//! use epidemic_dqn::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![1.0, -0.5, 0.0, 2.0];
//! Activation::Relu.apply(&mut data);
//! assert_eq!(data, array![1.0, 0.0, 0.0, 2.0]);
//! ```

pub mod functions;

pub use functions::Activation;
