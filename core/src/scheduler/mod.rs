pub mod reservation;
pub mod timeline;

pub use reservation::ReservationTable;
pub use timeline::Timeline;
