pub mod embed;
pub mod slug;
