pub use zenattr_core::registry::{RESERVED_CHARS, is_valid_chunk};

/// Default key expression prefix for fieldbus attribute bridges.
pub const KEY_PREFIX: &str = "zenattr/fieldbus";

/// Builder for the key expressions a device exposes.
///
/// Key expressions follow the pattern:
/// `<prefix>/<device>/attr/<attribute>` for attributes and
/// `<prefix>/<device>/@/<command>` for administrative endpoints.
#[derive(Debug, Clone)]
pub struct AttributeKeys {
    prefix: String,
    device: String,
}

impl AttributeKeys {
    /// Create a builder for a device under the default prefix.
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_prefix(KEY_PREFIX, device)
    }

    /// Create a builder with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            device: device.into(),
        }
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The device name.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Key expression of a single attribute.
    ///
    /// # Example
    /// ```
    /// use zenattr_common::keyexpr::AttributeKeys;
    ///
    /// let keys = AttributeKeys::new("drive01");
    /// assert_eq!(keys.attribute("temp"), "zenattr/fieldbus/drive01/attr/temp");
    /// ```
    pub fn attribute(&self, name: &str) -> String {
        format!("{}/{}/attr/{}", self.prefix, self.device, name)
    }

    /// Wildcard matching every attribute of the device.
    pub fn attribute_wildcard(&self) -> String {
        format!("{}/{}/attr/*", self.prefix, self.device)
    }

    /// Runtime registration endpoint.
    pub fn register_key(&self) -> String {
        format!("{}/{}/@/register", self.prefix, self.device)
    }

    /// Attribute listing endpoint.
    pub fn attributes_key(&self) -> String {
        format!("{}/{}/@/attributes", self.prefix, self.device)
    }

    /// Bridge status key (one per bridge, not per device).
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }

    /// Bridge clock endpoint.
    pub fn time_key(&self) -> String {
        format!("{}/@/time", self.prefix)
    }

    /// Extract the attribute name from a key matched by
    /// [`attribute_wildcard`](Self::attribute_wildcard).
    ///
    /// Returns `None` for keys of other devices or other endpoints.
    pub fn parse_attribute<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let rest = rest.strip_prefix(self.device.as_str())?.strip_prefix('/')?;
        let name = rest.strip_prefix("attr/")?;

        if is_valid_chunk(name) {
            Some(name)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder() {
        let keys = AttributeKeys::new("drive01");

        assert_eq!(keys.attribute("temp"), "zenattr/fieldbus/drive01/attr/temp");
        assert_eq!(keys.attribute_wildcard(), "zenattr/fieldbus/drive01/attr/*");
        assert_eq!(keys.register_key(), "zenattr/fieldbus/drive01/@/register");
        assert_eq!(keys.attributes_key(), "zenattr/fieldbus/drive01/@/attributes");
        assert_eq!(keys.status_key(), "zenattr/fieldbus/@/status");
        assert_eq!(keys.time_key(), "zenattr/fieldbus/@/time");
    }

    #[test]
    fn test_parse_attribute() {
        let keys = AttributeKeys::with_prefix("plant/bus", "drive01");

        assert_eq!(
            keys.parse_attribute("plant/bus/drive01/attr/temp"),
            Some("temp")
        );
        assert_eq!(keys.parse_attribute("plant/bus/drive02/attr/temp"), None);
        assert_eq!(keys.parse_attribute("plant/bus/drive01/@/register"), None);
        assert_eq!(keys.parse_attribute("plant/bus/drive01/attr/a/b"), None);
        assert_eq!(keys.parse_attribute("plant/bus/drive01/attr/"), None);
    }
}
