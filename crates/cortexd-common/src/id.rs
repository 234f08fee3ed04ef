use uuid::Uuid;

/// Generate an opaque, collision-resistant alert id.
pub fn next_id() -> String {
    Uuid::new_v4().to_string()
}
