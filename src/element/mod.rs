pub mod element;
pub mod element_type;
pub mod scalar;

pub use element::Element;
pub use element_type::ElementType;
pub use scalar::Scalar;
