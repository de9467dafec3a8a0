pub mod allocation;
pub mod inventory;
pub mod purchase_orders;
pub mod receiving;
pub mod reservations;
