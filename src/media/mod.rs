pub mod mimetype;
pub mod normalizer;
pub mod reconciler;
pub mod references;
pub mod storage;
pub mod upload;
