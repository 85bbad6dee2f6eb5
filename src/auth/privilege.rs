//! Privilege model.
//!
//! Two policies coexist and are deliberately kept apart:
//!
//! - [`has_exact`] tests plain set membership. A user holding only
//!   `DELETE` does **not** pass a `VIEW` check.
//! - [`expand_grant`] is used when an administrator grants a tier to a
//!   folder. Granting `DELETE` yields every lower tier as well.
//!
//! Folder grants are therefore cumulative while user grants are literal.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single storage capability.
///
/// Ordered from least to most powerful.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    /// List directory contents.
    View,
    /// Export files into the download folder.
    Download,
    /// Create, move and import files and folders.
    Create,
    /// Delete files and folders.
    Delete,
}

/// A set of privileges with deterministic iteration order.
pub type PrivilegeSet = BTreeSet<Privilege>;

impl Privilege {
    /// All privileges, lowest tier first.
    pub const ALL: [Privilege; 4] = [
        Privilege::View,
        Privilege::Download,
        Privilege::Create,
        Privilege::Delete,
    ];

    /// Upper-case name as stored in the persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::View => "VIEW",
            Privilege::Download => "DOWNLOAD",
            Privilege::Create => "CREATE",
            Privilege::Delete => "DELETE",
        }
    }

    /// Full set of privileges, granted to the storage creator.
    pub fn all() -> PrivilegeSet {
        Self::ALL.into_iter().collect()
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VIEW" => Ok(Privilege::View),
            "DOWNLOAD" => Ok(Privilege::Download),
            "CREATE" => Ok(Privilege::Create),
            "DELETE" => Ok(Privilege::Delete),
            _ => Err(format!("unknown privilege: {s}")),
        }
    }
}

/// How folder-scoped privilege entries are looked up for a target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeScope {
    /// Only an entry registered for exactly the target path applies.
    Exact,
    /// The nearest entry registered for the target or one of its ancestors applies.
    #[default]
    Inherited,
}

/// Exact membership test, no cumulative closure.
///
/// # Examples
///
/// ```
/// use quotastore::auth::{has_exact, Privilege, PrivilegeSet};
///
/// let set: PrivilegeSet = [Privilege::Delete].into_iter().collect();
/// assert!(has_exact(&set, Privilege::Delete));
/// assert!(!has_exact(&set, Privilege::View));
/// ```
pub fn has_exact(set: &PrivilegeSet, privilege: Privilege) -> bool {
    set.contains(&privilege)
}

/// Expand an administrative grant to its cumulative tier.
///
/// Only the highest requested tier matters; tiers are checked
/// DELETE, CREATE, DOWNLOAD, VIEW and the first match wins.
///
/// # Examples
///
/// ```
/// use quotastore::auth::{expand_grant, Privilege, PrivilegeSet};
///
/// let requested: PrivilegeSet = [Privilege::Download].into_iter().collect();
/// let granted = expand_grant(&requested);
/// assert!(granted.contains(&Privilege::View));
/// assert!(!granted.contains(&Privilege::Create));
/// ```
pub fn expand_grant(requested: &PrivilegeSet) -> PrivilegeSet {
    let tier: &[Privilege] = if requested.contains(&Privilege::Delete) {
        &[
            Privilege::Delete,
            Privilege::Create,
            Privilege::Download,
            Privilege::View,
        ]
    } else if requested.contains(&Privilege::Create) {
        &[Privilege::Create, Privilege::Download, Privilege::View]
    } else if requested.contains(&Privilege::Download) {
        &[Privilege::Download, Privilege::View]
    } else if requested.contains(&Privilege::View) {
        &[Privilege::View]
    } else {
        &[]
    };
    tier.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(privileges: &[Privilege]) -> PrivilegeSet {
        privileges.iter().copied().collect()
    }

    #[test]
    fn test_has_exact_is_not_cumulative() {
        let delete_only = set(&[Privilege::Delete]);
        assert!(has_exact(&delete_only, Privilege::Delete));
        assert!(!has_exact(&delete_only, Privilege::Create));
        assert!(!has_exact(&delete_only, Privilege::View));
    }

    #[test]
    fn test_expand_grant_tiers() {
        assert_eq!(expand_grant(&set(&[Privilege::Delete])), Privilege::all());
        assert_eq!(
            expand_grant(&set(&[Privilege::Create])),
            set(&[Privilege::Create, Privilege::Download, Privilege::View])
        );
        assert_eq!(
            expand_grant(&set(&[Privilege::Download])),
            set(&[Privilege::Download, Privilege::View])
        );
        assert_eq!(expand_grant(&set(&[Privilege::View])), set(&[Privilege::View]));
    }

    #[test]
    fn test_expand_grant_highest_tier_wins() {
        let requested = set(&[Privilege::View, Privilege::Create]);
        assert!(expand_grant(&requested).contains(&Privilege::Download));
        assert!(!expand_grant(&requested).contains(&Privilege::Delete));
    }

    #[test]
    fn test_expand_grant_empty() {
        assert!(expand_grant(&PrivilegeSet::new()).is_empty());
    }

    #[test]
    fn test_privilege_ordering() {
        assert!(Privilege::View < Privilege::Download);
        assert!(Privilege::Create < Privilege::Delete);
    }

    #[test]
    fn test_privilege_from_str() {
        assert_eq!("view".parse::<Privilege>().unwrap(), Privilege::View);
        assert_eq!("DELETE".parse::<Privilege>().unwrap(), Privilege::Delete);
        assert!("write".parse::<Privilege>().is_err());
    }

    #[test]
    fn test_privilege_serde_names() {
        let json = serde_json::to_string(&Privilege::Download).unwrap();
        assert_eq!(json, "\"DOWNLOAD\"");
        let parsed: Privilege = serde_json::from_str("\"CREATE\"").unwrap();
        assert_eq!(parsed, Privilege::Create);
    }
}
