use provisor_state::StateKey;

/// Render a [`StateKey`] as `prefix:namespace:kind:id`.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!("{prefix}:{}", key.canonical())
}
