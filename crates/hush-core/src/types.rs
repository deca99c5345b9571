//! Core type definitions for hush
//!
//! Content types use the bit values of the Adblock Plus filter engine so that
//! masks coming from embedders can be passed through unchanged.

use serde::{Deserialize, Serialize};

// =============================================================================
// Filter Types
// =============================================================================

/// Classification of a compiled filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FilterType {
    /// URL blocking filter
    Blocking = 0,
    /// URL exception filter (@@...)
    Exception = 1,
    /// Element hiding filter (##)
    ElemHide = 2,
    /// Element hiding exception (#@#)
    ElemHideException = 3,
    /// Element hiding emulation filter (#?#)
    ElemHideEmulation = 4,
    /// Exception filter restricted to $genericblock
    GenericBlockException = 5,
    /// Comment or blank line
    Comment = 6,
    /// Malformed filter, never matches
    Invalid = 7,
}

impl FilterType {
    /// Stable lowercase name, used in event payloads and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Exception => "exception",
            Self::ElemHide => "elemhide",
            Self::ElemHideException => "elemhide_exception",
            Self::ElemHideEmulation => "elemhide_emulation",
            Self::GenericBlockException => "genericblock_exception",
            Self::Comment => "comment",
            Self::Invalid => "invalid",
        }
    }

    /// Exception family (URL allowlisting).
    #[inline]
    pub fn is_exception(self) -> bool {
        matches!(self, Self::Exception | Self::GenericBlockException)
    }

    /// URL-pattern family (blocking or exception).
    #[inline]
    pub fn is_network(self) -> bool {
        matches!(self, Self::Blocking | Self::Exception | Self::GenericBlockException)
    }

    /// Element hiding family.
    #[inline]
    pub fn is_element_hiding(self) -> bool {
        matches!(
            self,
            Self::ElemHide | Self::ElemHideException | Self::ElemHideEmulation
        )
    }
}

impl TryFrom<u8> for FilterType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Blocking),
            1 => Ok(Self::Exception),
            2 => Ok(Self::ElemHide),
            3 => Ok(Self::ElemHideException),
            4 => Ok(Self::ElemHideEmulation),
            5 => Ok(Self::GenericBlockException),
            6 => Ok(Self::Comment),
            7 => Ok(Self::Invalid),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Content Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Content type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContentType: u32 {
        const OTHER = 1;
        const SCRIPT = 2;
        const IMAGE = 4;
        const STYLESHEET = 8;
        const OBJECT = 16;
        const SUBDOCUMENT = 32;  // iframe/frame
        const DOCUMENT = 64;     // whole-document allowlisting
        const WEBSOCKET = 128;
        const WEBRTC = 256;
        const CSP = 512;
        const PING = 1024;
        const XMLHTTPREQUEST = 2048;
        const OBJECT_SUBREQUEST = 4096;
        const MEDIA = 16384;
        const FONT = 32768;
        const POPUP = 0x1000_0000;
        const GENERICBLOCK = 0x2000_0000;
        const ELEMHIDE = 0x4000_0000;
        const GENERICHIDE = 0x8000_0000;

        /// Mask applied when a filter names no content type.
        const RESOURCE_TYPES = Self::OTHER.bits()
            | Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::OBJECT.bits()
            | Self::SUBDOCUMENT.bits()
            | Self::WEBSOCKET.bits()
            | Self::WEBRTC.bits()
            | Self::PING.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::OBJECT_SUBREQUEST.bits()
            | Self::MEDIA.bits()
            | Self::FONT.bits();
    }
}

const KEYWORDS: &[(&str, ContentType)] = &[
    ("other", ContentType::OTHER),
    ("script", ContentType::SCRIPT),
    ("image", ContentType::IMAGE),
    ("stylesheet", ContentType::STYLESHEET),
    ("object", ContentType::OBJECT),
    ("subdocument", ContentType::SUBDOCUMENT),
    ("document", ContentType::DOCUMENT),
    ("websocket", ContentType::WEBSOCKET),
    ("webrtc", ContentType::WEBRTC),
    ("csp", ContentType::CSP),
    ("ping", ContentType::PING),
    ("xmlhttprequest", ContentType::XMLHTTPREQUEST),
    ("object_subrequest", ContentType::OBJECT_SUBREQUEST),
    ("media", ContentType::MEDIA),
    ("font", ContentType::FONT),
    ("popup", ContentType::POPUP),
    ("genericblock", ContentType::GENERICBLOCK),
    ("elemhide", ContentType::ELEMHIDE),
    ("generichide", ContentType::GENERICHIDE),
];

impl ContentType {
    /// Parse a filter option keyword (`image`, `object-subrequest`, ...).
    ///
    /// Matching is case-insensitive and treats `-` like `_`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let normalized = keyword.to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "background" => return Some(Self::IMAGE),
            "xbl" | "dtd" => return Some(Self::OTHER),
            _ => {}
        }
        KEYWORDS
            .iter()
            .find(|(name, _)| *name == normalized)
            .map(|(_, ty)| *ty)
    }

    /// Parse a comma-separated keyword list, as accepted by the CLI.
    pub fn parse_list(list: &str) -> Option<Self> {
        let mut mask = Self::empty();
        for part in list.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            mask |= Self::from_keyword(part)?;
        }
        Some(mask)
    }

    /// Keyword names of every bit set in this mask.
    pub fn keywords(self) -> Vec<&'static str> {
        KEYWORDS
            .iter()
            .filter(|(_, ty)| self.contains(*ty))
            .map(|(name, _)| *name)
            .collect()
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

impl PartyMask {
    /// Does a request with the given party state pass this mask?
    #[inline]
    pub fn allows(self, is_third_party: bool) -> bool {
        if is_third_party {
            self.contains(Self::THIRD_PARTY)
        } else {
            self.contains(Self::FIRST_PARTY)
        }
    }
}

impl Default for PartyMask {
    fn default() -> Self {
        Self::ALL
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// A single network request, resolved against its immediate parent document.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Content type bits of the request
    pub content_type: ContentType,
    /// Host of the requesting document, empty when unknown
    pub doc_domain: &'a str,
    /// Is this a third-party request?
    pub is_third_party: bool,
    /// Site key offered by the document, if any
    pub site_key: Option<&'a str>,
    /// Skip generic blocking filters ($genericblock)
    pub specific_only: bool,
}

// =============================================================================
// Emulation Selectors
// =============================================================================

/// Element hiding emulation selector together with its source filter text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulationSelector {
    pub selector: String,
    pub text: String,
}
