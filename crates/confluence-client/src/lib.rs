pub mod confluence;
