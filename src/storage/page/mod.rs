mod slotted_page;

pub use slotted_page::SlottedPage;
