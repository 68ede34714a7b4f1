//! Layout-relevant prop allow-list
//!
//! Decides which prop writes must go through the host's commit cycle (they
//! affect layout) and which can take the synchronous fast path (pure paint
//! properties). The built-in table covers the usual flexbox/geometry keys;
//! hosts extend it through `configure`.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

static BUILTIN_LAYOUT_PROPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "width",
        "height",
        "minWidth",
        "minHeight",
        "maxWidth",
        "maxHeight",
        "top",
        "left",
        "right",
        "bottom",
        "start",
        "end",
        "margin",
        "marginTop",
        "marginBottom",
        "marginLeft",
        "marginRight",
        "padding",
        "paddingTop",
        "paddingBottom",
        "paddingLeft",
        "paddingRight",
        "flex",
        "flexGrow",
        "flexShrink",
        "flexBasis",
        "flexDirection",
        "alignItems",
        "alignSelf",
        "justifyContent",
        "position",
        "display",
        "aspectRatio",
    ]
    .into_iter()
    .collect()
});

pub struct LayoutPropsTable {
    configured: RwLock<HashSet<String>>,
}

impl LayoutPropsTable {
    pub fn new() -> Self {
        Self {
            configured: RwLock::new(HashSet::new()),
        }
    }

    /// Add host-configured layout-relevant prop names.
    pub fn configure<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut configured = self.configured.write();
        for name in names {
            configured.insert(name.into());
        }
    }

    pub fn is_layout_prop(&self, name: &str) -> bool {
        BUILTIN_LAYOUT_PROPS.contains(name) || self.configured.read().contains(name)
    }

    pub fn any_layout_prop<'a, I: IntoIterator<Item = &'a String>>(&self, keys: I) -> bool {
        keys.into_iter().any(|key| self.is_layout_prop(key))
    }
}

impl Default for LayoutPropsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_and_configured_props() {
        let table = LayoutPropsTable::new();
        assert!(table.is_layout_prop("width"));
        assert!(!table.is_layout_prop("opacity"));
        assert!(!table.is_layout_prop("shadowRadius"));

        table.configure(["shadowRadius"]);
        assert!(table.is_layout_prop("shadowRadius"));
    }
}
