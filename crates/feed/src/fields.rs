// ABOUTME: Declarative tables of namespace extension fields copied into archive records.
// ABOUTME: One pass over the raw elements fills a sparse map with only the fields present.

use crate::extensions::RawElement;
use crate::models::{ExtensionFields, FieldValue};

/// Fields contributed by one namespace.
///
/// `text` elements are copied from their text content; `attributes` name elements whose
/// value lives in an attribute (used when the element has no text).
#[derive(Debug, Clone, Copy)]
pub struct NamespaceFields {
    pub prefix: &'static str,
    pub text: &'static [&'static str],
    pub attributes: &'static [(&'static str, &'static str)],
}

const DUBLIN_CORE: NamespaceFields = NamespaceFields {
    prefix: "dc",
    text: &[
        "title",
        "creator",
        "subject",
        "description",
        "publisher",
        "contributor",
        "date",
        "type",
        "format",
        "identifier",
        "source",
        "language",
        "relation",
        "coverage",
        "rights",
    ],
    attributes: &[],
};

const DC_TERMS: NamespaceFields = NamespaceFields {
    prefix: "dcterms",
    text: &[
        "created",
        "modified",
        "issued",
        "available",
        "license",
        "rightsHolder",
        "abstract",
    ],
    attributes: &[],
};

const MEDIA_RSS: NamespaceFields = NamespaceFields {
    prefix: "media",
    text: &[
        "title",
        "description",
        "keywords",
        "credit",
        "copyright",
        "rating",
        "category",
        "text",
        "license",
    ],
    attributes: &[("license", "href"), ("copyright", "url")],
};

const CREATIVE_COMMONS: NamespaceFields = NamespaceFields {
    prefix: "creativeCommons",
    text: &["license"],
    attributes: &[],
};

const CC: NamespaceFields = NamespaceFields {
    prefix: "cc",
    text: &["license"],
    attributes: &[("license", "rdf:resource")],
};

const GEO: NamespaceFields = NamespaceFields {
    prefix: "geo",
    text: &["lat", "long", "alt"],
    attributes: &[],
};

const GEORSS: NamespaceFields = NamespaceFields {
    prefix: "georss",
    text: &["point", "line", "polygon", "box", "featurename", "elev", "radius"],
    attributes: &[],
};

const SYNDICATION: NamespaceFields = NamespaceFields {
    prefix: "sy",
    text: &["updatePeriod", "updateFrequency", "updateBase"],
    attributes: &[],
};

/// Entry-level fields.
pub const ITEM_FIELDS: &[NamespaceFields] = &[
    DUBLIN_CORE,
    DC_TERMS,
    NamespaceFields {
        prefix: "itunes",
        text: &[
            "title",
            "author",
            "subtitle",
            "summary",
            "duration",
            "explicit",
            "episode",
            "season",
            "episodeType",
            "keywords",
            "block",
            "order",
            "isClosedCaptioned",
        ],
        attributes: &[],
    },
    NamespaceFields {
        prefix: "podcast",
        text: &["season", "episode", "guid", "location", "person", "license", "soundbite"],
        attributes: &[("license", "url"), ("soundbite", "startTime")],
    },
    MEDIA_RSS,
    CREATIVE_COMMONS,
    CC,
    GEO,
    GEORSS,
    SYNDICATION,
    NamespaceFields {
        prefix: "slash",
        text: &["comments", "section", "department", "hit_parade"],
        attributes: &[],
    },
    NamespaceFields {
        prefix: "wfw",
        text: &["commentRss", "comment"],
        attributes: &[],
    },
    NamespaceFields {
        prefix: "googleplay",
        text: &["author", "description", "explicit", "block"],
        attributes: &[],
    },
];

/// Channel-level fields.
pub const CHANNEL_FIELDS: &[NamespaceFields] = &[
    NamespaceFields {
        prefix: "itunes",
        text: &[
            "author",
            "subtitle",
            "summary",
            "explicit",
            "type",
            "keywords",
            "block",
            "complete",
            "new-feed-url",
            "name",
            "email",
        ],
        attributes: &[("category", "text")],
    },
    NamespaceFields {
        prefix: "podcast",
        text: &["locked", "funding", "guid", "medium", "location", "person", "license", "txt"],
        attributes: &[("funding", "url"), ("license", "url")],
    },
    NamespaceFields {
        prefix: "googleplay",
        text: &["author", "description", "email", "explicit", "owner", "block"],
        attributes: &[("category", "text")],
    },
    DUBLIN_CORE,
    DC_TERMS,
    MEDIA_RSS,
    CREATIVE_COMMONS,
    CC,
    GEO,
    GEORSS,
    SYNDICATION,
];

/// Copies every element listed in `table` into a sparse field map keyed `prefix:name`.
///
/// Absent or empty fields are skipped; repeated ones keep every value in document order.
pub fn collect_fields<'a>(
    elements: impl IntoIterator<Item = &'a RawElement>,
    table: &[NamespaceFields],
) -> ExtensionFields {
    let mut fields = ExtensionFields::new();

    for element in elements {
        let (Some(prefix), local) = element.split_name() else {
            continue;
        };
        let Some(ns) = table.iter().find(|ns| ns.prefix == prefix) else {
            continue;
        };

        let value = element
            .text()
            .filter(|_| ns.text.contains(&local))
            .map(str::to_string)
            .or_else(|| {
                ns.attributes
                    .iter()
                    .filter(|(name, _)| *name == local)
                    .find_map(|(_, attr)| element.attr(attr))
                    .map(str::to_string)
            });

        if let Some(value) = value {
            fields
                .entry(element.name.clone())
                .and_modify(|existing| existing.push(value.clone()))
                .or_insert(FieldValue::Single(value));
        }
    }

    fields
}
