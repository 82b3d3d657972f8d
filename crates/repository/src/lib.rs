pub mod memory;
pub mod pg;

pub use memory::MemoryRepository;
pub use pg::PgRepository;
