pub mod department;
pub mod shift;
pub mod ticket;
