// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The closed registry of entity kinds.
//!
//! Every kind that owns an isolated cache, a repository cache policy or a refresher is listed here. A few
//! entries describe interfaces rather than concrete entities; they are flagged as subtype-inclusive and list
//! the concrete kinds they cover. Eviction by kind uses [`EntityKind::includes`] as its single matching rule.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Content items.
    Content,
    /// Media items.
    Media,
    /// Members.
    Member,
    /// Back-office users.
    User,
    /// User groups.
    UserGroup,
    /// Content types.
    ContentType,
    /// Media types.
    MediaType,
    /// Member types.
    MemberType,
    /// Data types.
    DataType,
    /// Templates.
    Template,
    /// Languages.
    Language,
    /// Domains.
    Domain,
    /// Dictionary items.
    DictionaryItem,
    /// Relation types.
    RelationType,
    /// Public access entries.
    PublicAccessEntry,
    /// Member groups.
    MemberGroup,
    /// Any content-like item: content, media or member.
    ContentBase,
    /// Any composable type: content type, media type or member type.
    ContentTypeComposition,
}

/// Static description of an [`EntityKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// Stable name used in cache keys and persisted version records.
    pub name: &'static str,
    /// Whether the kind also matches the concrete kinds listed in `members`.
    pub subtype_inclusive: bool,
    /// Concrete kinds covered by a subtype-inclusive kind.
    pub members: &'static [EntityKind],
}

const fn exact(name: &'static str) -> KindDescriptor {
    KindDescriptor {
        name,
        subtype_inclusive: false,
        members: &[],
    }
}

const CONTENT: KindDescriptor = exact("Content");
const MEDIA: KindDescriptor = exact("Media");
const MEMBER: KindDescriptor = exact("Member");
const USER: KindDescriptor = exact("User");
const USER_GROUP: KindDescriptor = exact("UserGroup");
const CONTENT_TYPE: KindDescriptor = exact("ContentType");
const MEDIA_TYPE: KindDescriptor = exact("MediaType");
const MEMBER_TYPE: KindDescriptor = exact("MemberType");
const DATA_TYPE: KindDescriptor = exact("DataType");
const TEMPLATE: KindDescriptor = exact("Template");
const LANGUAGE: KindDescriptor = exact("Language");
const DOMAIN: KindDescriptor = exact("Domain");
const DICTIONARY_ITEM: KindDescriptor = exact("DictionaryItem");
const RELATION_TYPE: KindDescriptor = exact("RelationType");
const PUBLIC_ACCESS_ENTRY: KindDescriptor = exact("PublicAccessEntry");
const MEMBER_GROUP: KindDescriptor = exact("MemberGroup");
const CONTENT_BASE: KindDescriptor = KindDescriptor {
    name: "ContentBase",
    subtype_inclusive: true,
    members: &[EntityKind::Content, EntityKind::Media, EntityKind::Member],
};
const CONTENT_TYPE_COMPOSITION: KindDescriptor = KindDescriptor {
    name: "ContentTypeComposition",
    subtype_inclusive: true,
    members: &[EntityKind::ContentType, EntityKind::MediaType, EntityKind::MemberType],
};

impl EntityKind {
    /// Every registered kind, concrete kinds first.
    pub const ALL: [Self; 18] = [
        Self::Content,
        Self::Media,
        Self::Member,
        Self::User,
        Self::UserGroup,
        Self::ContentType,
        Self::MediaType,
        Self::MemberType,
        Self::DataType,
        Self::Template,
        Self::Language,
        Self::Domain,
        Self::DictionaryItem,
        Self::RelationType,
        Self::PublicAccessEntry,
        Self::MemberGroup,
        Self::ContentBase,
        Self::ContentTypeComposition,
    ];

    /// Returns the static descriptor of this kind.
    #[must_use]
    pub const fn descriptor(self) -> &'static KindDescriptor {
        match self {
            Self::Content => &CONTENT,
            Self::Media => &MEDIA,
            Self::Member => &MEMBER,
            Self::User => &USER,
            Self::UserGroup => &USER_GROUP,
            Self::ContentType => &CONTENT_TYPE,
            Self::MediaType => &MEDIA_TYPE,
            Self::MemberType => &MEMBER_TYPE,
            Self::DataType => &DATA_TYPE,
            Self::Template => &TEMPLATE,
            Self::Language => &LANGUAGE,
            Self::Domain => &DOMAIN,
            Self::DictionaryItem => &DICTIONARY_ITEM,
            Self::RelationType => &RELATION_TYPE,
            Self::PublicAccessEntry => &PUBLIC_ACCESS_ENTRY,
            Self::MemberGroup => &MEMBER_GROUP,
            Self::ContentBase => &CONTENT_BASE,
            Self::ContentTypeComposition => &CONTENT_TYPE_COMPOSITION,
        }
    }

    /// Returns the stable name of this kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Returns `true` if this kind stands for an interface covering other kinds.
    #[must_use]
    pub const fn is_subtype_inclusive(self) -> bool {
        self.descriptor().subtype_inclusive
    }

    /// Returns `true` if a value whose runtime kind is `runtime` belongs to this kind.
    ///
    /// A concrete kind matches only itself. A subtype-inclusive kind matches itself and its members.
    #[must_use]
    pub fn includes(self, runtime: Self) -> bool {
        if self == runtime {
            return true;
        }

        let descriptor = self.descriptor();
        descriptor.subtype_inclusive && descriptor.members.contains(&runtime)
    }

    /// Resolves a kind from its stable name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
