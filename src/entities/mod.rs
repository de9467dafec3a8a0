pub mod inventory_lot;
pub mod inventory_reservation;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod receiving_workflow;
