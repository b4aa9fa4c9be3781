//! SSH protocol 1.5 identification string exchange.
//!
//! A connection begins with both sides sending an identification line:
//!
//! ```text
//! SSH-protoversion-softwareversion LF
//! ```
//!
//! Example: `SSH-1.5-Skiff 0.1.0`
//!
//! Protocol 1 lines are terminated by a bare `\n` (the CRLF convention
//! arrived with protocol 2). Servers that also speak protocol 2 announce
//! `1.99` and fall back to the 1.5 packet format when the client does.
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh1::version::Version;
//!
//! let version = Version::new("Skiff", Some("0.1.0"));
//! assert_eq!(version.to_string(), "SSH-1.5-Skiff 0.1.0");
//!
//! let parsed = Version::parse("SSH-1.99-OpenSSH_3.4p1").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_3.4p1");
//! ```

use skiff_platform::{SkiffError, SkiffResult};

/// Maximum length of an identification line (DoS prevention).
pub const MAX_VERSION_LENGTH: usize = 255;

/// SSH identification string.
///
/// Represents the identification line exchanged at connection start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Protocol version (e.g., "1.5")
    proto_version: String,
    /// Software version (e.g., "Skiff")
    software_version: String,
    /// Optional comments
    comments: Option<String>,
}

impl Version {
    /// Creates a new identification string for protocol version 1.5.
    ///
    /// # Arguments
    ///
    /// * `software` - Software name (e.g., "Skiff")
    /// * `comments` - Optional trailing text (e.g., a release version)
    ///
    /// # Example
    ///
    /// ```rust
    /// use skiff_proto::ssh1::version::Version;
    ///
    /// let version = Version::new("Skiff", None);
    /// assert_eq!(version.to_string(), "SSH-1.5-Skiff");
    /// ```
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "1.5".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Returns the default Skiff identification string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use skiff_proto::ssh1::version::Version;
    ///
    /// let version = Version::default_skiff();
    /// assert!(version.to_string().starts_with("SSH-1.5-Skiff"));
    /// ```
    pub fn default_skiff() -> Self {
        Self::new("Skiff", Some(env!("CARGO_PKG_VERSION")))
    }

    /// Parses an identification line.
    ///
    /// # Arguments
    ///
    /// * `line` - The identification line (with or without the trailing LF)
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Protocol`] if:
    /// - The line is longer than 255 characters
    /// - The line does not start with "SSH-"
    /// - The protocol major version is not 1 (1.99 servers are accepted;
    ///   they fall back to the 1.5 packet format)
    /// - The line contains a null byte
    ///
    /// # Example
    ///
    /// ```rust
    /// use skiff_proto::ssh1::version::Version;
    ///
    /// let version = Version::parse("SSH-1.5-1.2.27\n").unwrap();
    /// assert_eq!(version.software(), "1.2.27");
    /// ```
    pub fn parse(line: &str) -> SkiffResult<Self> {
        // Strip the terminator if present (some servers send CRLF even in
        // protocol 1)
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        if line.len() > MAX_VERSION_LENGTH {
            return Err(SkiffError::Protocol(format!(
                "Identification line too long: {} bytes (max {})",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(SkiffError::Protocol(
                "Identification line contains null byte".to_string(),
            ));
        }

        if !line.starts_with("SSH-") {
            return Err(SkiffError::Protocol(format!(
                "Invalid identification line: must start with 'SSH-', got '{}'",
                line
            )));
        }

        // Parse: SSH-protoversion-softwareversion[ comments]
        let parts: Vec<&str> = line.splitn(3, '-').collect();
        if parts.len() < 3 {
            return Err(SkiffError::Protocol(format!(
                "Invalid identification line format: '{}'",
                line
            )));
        }

        let proto_version = parts[1];
        let rest = parts[2];

        // Protocol 1 only. "1.99" means the server also speaks protocol 2
        // and will use the 1.5 packet format with us.
        if !proto_version.starts_with("1.") {
            return Err(SkiffError::Protocol(format!(
                "Unsupported protocol version: '{}' (expected 1.x)",
                proto_version
            )));
        }

        // Split software version and comments (space-separated)
        let (software_version, comments) = if let Some(space_pos) = rest.find(' ') {
            let software = rest[..space_pos].to_string();
            let comments = rest[space_pos + 1..].trim().to_string();
            (software, Some(comments))
        } else {
            (rest.to_string(), None)
        };

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version (e.g., "1.5").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version (e.g., "Skiff").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format (LF-terminated).
    ///
    /// # Example
    ///
    /// ```rust
    /// use skiff_proto::ssh1::version::Version;
    ///
    /// let version = Version::new("Skiff", None);
    /// assert_eq!(version.to_wire_format(), b"SSH-1.5-Skiff\n");
    /// ```
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\n", self).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}
