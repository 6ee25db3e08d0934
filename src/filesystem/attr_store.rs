//! Component B: the pure computation behind every attribute update. Kept separate from [`Node`]
//! so the "what changes" logic has no lock-acquisition concerns mixed in.
//!
//! [`Node`]: crate::filesystem::Node

use crate::codec::{CommonAttrs, XAttrs, XAttrsChange};

/// Applies an xattr change and stamps `mtime`, without touching `ctime`. Removals are applied
/// before sets (see [`XAttrs::apply`]), so a change that both removes and re-sets the same name
/// leaves it set.
pub fn apply_update(
    attrs: CommonAttrs,
    xattrs: &XAttrs,
    change: Option<XAttrsChange>,
    now_ms: u64,
) -> (CommonAttrs, XAttrs) {
    let mut xattrs = xattrs.clone();
    if let Some(change) = change {
        xattrs.apply(change);
    }

    (attrs.touched(now_ms), xattrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_with_no_change_only_touches_mtime() {
        let attrs = CommonAttrs { ctime: 10, mtime: 10 };
        let xattrs = XAttrs::default();

        let (new_attrs, new_xattrs) = apply_update(attrs, &xattrs, None, 20);

        assert_eq!(new_attrs.ctime, 10);
        assert_eq!(new_attrs.mtime, 20);
        assert!(new_xattrs.is_empty());
    }

    #[test]
    fn update_applies_change_atomically() {
        let attrs = CommonAttrs { ctime: 1, mtime: 1 };
        let mut xattrs = XAttrs::default();
        xattrs.apply(XAttrsChange::new().setting("a", b"1".to_vec()));

        let change = XAttrsChange::new().removing("a").setting("a", b"2".to_vec());
        let (_, new_xattrs) = apply_update(attrs, &xattrs, Some(change), 5);

        assert_eq!(new_xattrs.get("a"), Some(b"2".as_slice()));
    }
}
