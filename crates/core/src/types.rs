/// Ordinal assigned to each worker by the dispatcher (its chunk index).
pub type WorkerId = u32;
