pub mod index_model;
