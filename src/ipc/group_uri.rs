use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::bail;


/// A multicast group address of the form `scheme://rest`, e.g. `ip://239.0.0.1:1234`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GroupUri(String);

impl GroupUri {
    pub fn parse(s: &str) -> anyhow::Result<GroupUri> {
        let Some((scheme, rest)) = s.split_once("://") else {
            bail!("group URI {:?} has no scheme", s);
        };

        let mut scheme_chars = scheme.chars();
        match scheme_chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => bail!("group URI {:?} has an invalid scheme", s),
        }
        if !scheme_chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
            bail!("group URI {:?} has an invalid scheme", s);
        }
        if rest.is_empty() {
            bail!("group URI {:?} has no group part", s);
        }

        Ok(GroupUri(s.to_string()))
    }

    /// URIs coming from the middleware are taken as they are
    pub(crate) fn from_wire(s: String) -> GroupUri {
        GroupUri(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or("")
    }
}

impl FromStr for GroupUri {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupUri::parse(s)
    }
}

impl TryFrom<&str> for GroupUri {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        GroupUri::parse(value)
    }
}

impl Display for GroupUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
