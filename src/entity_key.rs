const COMPONENT_MAX_LEN: usize = 255;
const SEPARATOR: char = '#';

/// Identifies the physical source of readings: a room within a building.
///
/// Components must be non-empty, at most 255 bytes each and must not
/// contain `#`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Debug)]
pub struct EntityKey<'a> {
    building: &'a str,
    room: &'a str,
}

impl std::fmt::Display for EntityKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.building, self.room)
    }
}

impl<'a> TryFrom<(&'a str, &'a str)> for EntityKey<'a> {
    type Error = ();

    fn try_from((building, room): (&'a str, &'a str)) -> Result<Self, Self::Error> {
        if is_valid_component(building) && is_valid_component(room) {
            Ok(Self { building, room })
        } else {
            Err(())
        }
    }
}

impl<'a> EntityKey<'a> {
    /// The building component.
    #[must_use]
    pub fn building(&self) -> &'a str {
        self.building
    }

    /// The room component.
    #[must_use]
    pub fn room(&self) -> &'a str {
        self.room
    }

    /// Formats the key for use as a store/index key.
    pub(crate) fn format(&self) -> String {
        let mut s = String::with_capacity(self.building.len() + 1 + self.room.len());
        s.push_str(self.building);
        s.push(SEPARATOR);
        s.push_str(self.room);
        s
    }

    pub(crate) fn parse(s: &'a str) -> Option<Self> {
        let (building, room) = s.split_once(SEPARATOR)?;
        Self::try_from((building, room)).ok()
    }
}

fn is_valid_component(s: &str) -> bool {
    !s.is_empty() && s.len() <= COMPONENT_MAX_LEN && !s.contains(SEPARATOR)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test_log::test]
    fn format_entity_key() {
        let key = EntityKey::try_from(("b7", "r101")).unwrap();
        assert_eq!("b7#r101", key.format());
        assert_eq!("b7#r101", key.to_string());
    }

    #[test_log::test]
    fn reject_empty_components() {
        assert!(EntityKey::try_from(("", "r101")).is_err());
        assert!(EntityKey::try_from(("b7", "")).is_err());
    }

    #[test_log::test]
    fn reject_separator_in_component() {
        assert!(EntityKey::try_from(("b#7", "r101")).is_err());
        assert!(EntityKey::try_from(("b7", "r#101")).is_err());
    }

    #[test_log::test]
    fn reject_oversized_component() {
        let long = "x".repeat(256);
        assert!(EntityKey::try_from((long.as_str(), "r101")).is_err());
        assert!(EntityKey::try_from(("y".repeat(255).as_str(), "r101")).is_ok());
    }

    #[test_log::test]
    fn parse_round_trip() {
        let key = EntityKey::try_from(("hq", "server-room")).unwrap();
        let formatted = key.format();

        let parsed = EntityKey::parse(&formatted).unwrap();
        assert_eq!(key, parsed);
        assert_eq!("hq", parsed.building());
        assert_eq!("server-room", parsed.room());
    }

    #[test_log::test]
    fn parse_rejects_garbage() {
        assert!(EntityKey::parse("no-separator").is_none());
        assert!(EntityKey::parse("#room").is_none());
        assert!(EntityKey::parse("building#").is_none());
    }
}
