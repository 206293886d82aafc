use serde_repr::{Deserialize_repr, Serialize_repr};

/// Post lifecycle codes. Soft deletes flip the status to `Deleted`; the row
/// itself is never removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i64)]
pub enum PostStatus {
    Draft = 0,
    Published = 1,
    Pending = 2,
    Deleted = 3,
    Banned = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i64)]
pub enum CommentStatus {
    Normal = 0,
    Pending = 1,
    Deleted = 2,
    Banned = 3,
}

/// Tiebas are created pending review and only become visible once normal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i64)]
pub enum TiebaStatus {
    Pending = 0,
    Normal = 1,
    Banned = 2,
    Hidden = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i64)]
pub enum UserStatus {
    Disabled = 0,
    Normal = 1,
    Inactive = 2,
}

impl PostStatus {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl CommentStatus {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl TiebaStatus {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl UserStatus {
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Membership roles, stored as text. `Owner` is protected from self-removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Member,
    Moderator,
    Admin,
    Owner,
}

impl MemberRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Moderator => "moderator",
            MemberRole::Admin => "admin",
            MemberRole::Owner => "owner",
        }
    }

    pub fn from_str(role: &str) -> Option<Self> {
        match role {
            "member" => Some(MemberRole::Member),
            "moderator" => Some(MemberRole::Moderator),
            "admin" => Some(MemberRole::Admin),
            "owner" => Some(MemberRole::Owner),
            _ => None,
        }
    }

    /// Moderators and above can manage announcements.
    pub fn can_moderate(self) -> bool {
        !matches!(self, MemberRole::Member)
    }

    /// Owner and admin review join applications.
    pub fn can_review(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }
}

pub const REPORT_REASONS: [&str; 7] = [
    "spam",
    "porn",
    "violence",
    "illegal",
    "harassment",
    "misinformation",
    "other",
];

pub const POST_TYPES: [&str; 5] = ["normal", "vote", "image", "video", "link"];
