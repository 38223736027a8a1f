/// MIME type sniffed from the leading bytes of `data`.
pub fn detect_mimetype(data: &[u8]) -> String {
    match infer::get(data) {
        Some(kind) => kind.mime_type().to_string(),
        None => "application/octet-stream".to_string(),
    }
}

pub fn is_image(data: &[u8]) -> bool {
    infer::is_image(data)
}
