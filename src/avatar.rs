//! Avatar resolution
//!
//! Resolvers decorate outgoing messages with an avatar URL. They are
//! tried in order by `TryAvatars`; a failure of every resolver only means
//! the message goes out without one.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AvatarError;
use crate::identity::Identity;

/// Strategy for finding a user's avatar URL
pub trait Avatar: Send + Sync {
    /// Return the avatar URL for `identity`, or `AvatarError::NoAvatarUrl`
    /// if this strategy has none.
    fn avatar_url(&self, identity: &Identity) -> Result<String, AvatarError>;
}

/// Uses the avatar URL supplied by the auth provider
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthAvatar;

impl Avatar for AuthAvatar {
    fn avatar_url(&self, identity: &Identity) -> Result<String, AvatarError> {
        match identity.avatar_url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Err(AvatarError::NoAvatarUrl),
        }
    }
}

/// Builds a Gravatar URL from the user id
#[derive(Debug, Default, Clone, Copy)]
pub struct GravatarAvatar;

impl Avatar for GravatarAvatar {
    fn avatar_url(&self, identity: &Identity) -> Result<String, AvatarError> {
        if identity.user_id.is_empty() {
            return Err(AvatarError::NoAvatarUrl);
        }
        Ok(format!("//www.gravatar.com/avatar/{}", identity.user_id))
    }
}

/// Looks for an uploaded file named after the user id
#[derive(Debug, Clone)]
pub struct FileSystemAvatar {
    dir: PathBuf,
    prefix: String,
}

impl FileSystemAvatar {
    /// URL prefix the avatar directory is served under
    pub const DEFAULT_PREFIX: &'static str = "/avatars/";

    /// Resolve against files in `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    /// Override the URL prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl Avatar for FileSystemAvatar {
    fn avatar_url(&self, identity: &Identity) -> Result<String, AvatarError> {
        if identity.user_id.is_empty() {
            return Err(AvatarError::NoAvatarUrl);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let stem_matches = path
                .file_stem()
                .is_some_and(|stem| stem == identity.user_id.as_str());
            if !stem_matches {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                return Ok(format!("{}{}", self.prefix, name));
            }
        }
        Err(AvatarError::NoAvatarUrl)
    }
}

/// Ordered list of resolvers; the first success wins
#[derive(Default)]
pub struct TryAvatars(Vec<Box<dyn Avatar>>);

impl TryAvatars {
    /// Create from resolvers in priority order
    pub fn new(resolvers: Vec<Box<dyn Avatar>>) -> Self {
        Self(resolvers)
    }

    /// Append a lower-priority resolver
    pub fn push(mut self, resolver: impl Avatar + 'static) -> Self {
        self.0.push(Box::new(resolver));
        self
    }

    /// Number of resolvers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no resolvers
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Avatar for TryAvatars {
    fn avatar_url(&self, identity: &Identity) -> Result<String, AvatarError> {
        self.0
            .iter()
            .find_map(|resolver| resolver.avatar_url(identity).ok())
            .ok_or(AvatarError::NoAvatarUrl)
    }
}

impl std::fmt::Debug for TryAvatars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TryAvatars")
            .field("resolvers", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Identity {
        Identity::new("Alice").with_user_id("abc")
    }

    #[test]
    fn test_auth_avatar() {
        let identity = user().with_avatar_url("http://url-to-gravatar/");
        assert_eq!(
            AuthAvatar.avatar_url(&identity).unwrap(),
            "http://url-to-gravatar/"
        );
    }

    #[test]
    fn test_auth_avatar_missing() {
        assert!(matches!(
            AuthAvatar.avatar_url(&user()),
            Err(AvatarError::NoAvatarUrl)
        ));
    }

    #[test]
    fn test_gravatar_avatar() {
        assert_eq!(
            GravatarAvatar.avatar_url(&user()).unwrap(),
            "//www.gravatar.com/avatar/abc"
        );
        assert!(GravatarAvatar.avatar_url(&Identity::new("Anon")).is_err());
    }

    #[test]
    fn test_file_system_avatar() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc.jpg"), b"").unwrap();
        fs::write(dir.path().join("abcd.png"), b"").unwrap();

        let avatar = FileSystemAvatar::new(dir.path());
        assert_eq!(avatar.avatar_url(&user()).unwrap(), "/avatars/abc.jpg");

        let other = Identity::new("Zed").with_user_id("zzz");
        assert!(matches!(
            avatar.avatar_url(&other),
            Err(AvatarError::NoAvatarUrl)
        ));
    }

    #[test]
    fn test_file_system_avatar_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let avatar = FileSystemAvatar::new(dir.path().join("missing"));
        assert!(matches!(avatar.avatar_url(&user()), Err(AvatarError::Io(_))));
    }

    #[test]
    fn test_try_avatars_order() {
        let avatars = TryAvatars::default()
            .push(AuthAvatar)
            .push(GravatarAvatar);
        assert_eq!(avatars.len(), 2);

        assert_eq!(
            avatars.avatar_url(&user()).unwrap(),
            "//www.gravatar.com/avatar/abc"
        );

        let with_auth = user().with_avatar_url("http://provider/a.png");
        assert_eq!(
            avatars.avatar_url(&with_auth).unwrap(),
            "http://provider/a.png"
        );
    }

    #[test]
    fn test_try_avatars_all_fail() {
        let avatars = TryAvatars::default();
        assert!(avatars.is_empty());
        assert!(matches!(
            avatars.avatar_url(&user()),
            Err(AvatarError::NoAvatarUrl)
        ));
    }
}
