use std::borrow::Cow;

use bytes::Bytes;

/// A cheaply cloneable UTF-8 string backed by [`Bytes`].
///
/// Packet payloads are sliced out of transport buffers without copying, so
/// string packets are carried as a [`Str`] rather than a [`String`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Hash)]
pub struct Str(Bytes);

impl Str {
    /// Slice the string by calling [`Bytes::slice`] on the inner bytes.
    ///
    /// The range must lie on UTF-8 character boundaries, like [`str`] slicing.
    pub fn slice(&self, range: impl std::ops::RangeBounds<usize>) -> Self {
        let sliced = self.0.slice(range);
        debug_assert!(std::str::from_utf8(&sliced).is_ok());
        Str(sliced)
    }

    /// Return a `&str` view of the string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Str is always a valid utf8 string
        unsafe { std::str::from_utf8_unchecked(&self.0) }
    }

    /// Return the raw bytes of the string.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Build a [`Str`] from bytes already known to be valid UTF-8.
    ///
    /// # Safety
    /// The caller must guarantee that `bytes` is valid UTF-8.
    pub unsafe fn from_bytes_unchecked(bytes: Bytes) -> Self {
        Str(bytes)
    }

    /// Build a [`Str`] from arbitrary bytes, validating them.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, std::str::Utf8Error> {
        std::str::from_utf8(&bytes)?;
        Ok(Str(bytes))
    }
}

impl std::ops::Deref for Str {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}
impl std::fmt::Display for Str {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for Str {
    fn from(s: &'static str) -> Self {
        Str(Bytes::from_static(s.as_bytes()))
    }
}
impl From<String> for Str {
    fn from(s: String) -> Self {
        Str(Bytes::from(s.into_bytes()))
    }
}
impl From<Cow<'static, str>> for Str {
    fn from(s: Cow<'static, str>) -> Self {
        match s {
            Cow::Borrowed(s) => Str::from(s),
            Cow::Owned(s) => Str::from(s),
        }
    }
}
impl From<Str> for Bytes {
    fn from(s: Str) -> Self {
        s.0
    }
}
impl From<Str> for String {
    fn from(s: Str) -> Self {
        let vec = s.0.into();
        // SAFETY: Str is always a valid utf8 string
        unsafe { String::from_utf8_unchecked(vec) }
    }
}

impl PartialEq<&str> for Str {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}
impl PartialEq<Str> for &str {
    fn eq(&self, other: &Str) -> bool {
        *self == other.as_str()
    }
}

impl serde::Serialize for Str {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
impl<'de> serde::Deserialize<'de> for Str {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Str::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_is_zero_copy() {
        let s = Str::from("4hello".to_string());
        let sliced = s.slice(1..);
        assert_eq!(sliced, "hello");
        assert_eq!(s, "4hello");
    }

    #[test]
    fn from_bytes_rejects_invalid_utf8() {
        assert!(Str::from_bytes(Bytes::from_static(&[0xff, 0xfe])).is_err());
        let s = Str::from_bytes(Bytes::from_static("héllo".as_bytes())).unwrap();
        assert_eq!(s, "héllo");
    }
}
