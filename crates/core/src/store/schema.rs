//! Entity kind schemas.
//!
//! Every table the store manages is declared here as a [`KindSchema`]: its
//! primary key, its columns with their coercion tags, which field scopes rows
//! to a source, which fields participate in change detection during a sync,
//! and which fields are user-owned (set locally, preserved across re-syncs).
//!
//! All SQL built elsewhere in the store validates field names against these
//! declarations before interpolating them, so no statement is ever assembled
//! from unvalidated identifiers.

use serde_json::Value;

use super::StoreError;

/// How a column's stored representation maps to its application value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Stored and exposed as-is.
    None,
    /// Stored as 0/1 (or "0"/"1"/"true"/"false" text), exposed as a boolean.
    Boolean,
    /// Stored as serialized JSON text, exposed as the parsed structure.
    /// Unparseable text is exposed unchanged.
    Json,
    /// Stored as RFC 3339 text, passed through unmodified.
    Date,
}

/// A column declaration.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub coercion: Coercion,
}

const fn col(name: &'static str) -> Column {
    Column {
        name,
        coercion: Coercion::None,
    }
}

const fn boolean(name: &'static str) -> Column {
    Column {
        name,
        coercion: Coercion::Boolean,
    }
}

const fn json(name: &'static str) -> Column {
    Column {
        name,
        coercion: Coercion::Json,
    }
}

const fn date(name: &'static str) -> Column {
    Column {
        name,
        coercion: Coercion::Date,
    }
}

/// Default value for a user-owned field on a genuinely new row.
#[derive(Debug, Clone, Copy)]
pub enum FieldDefault {
    Null,
    Bool(bool),
    Int(i64),
}

impl FieldDefault {
    pub fn to_value(self) -> Value {
        match self {
            FieldDefault::Null => Value::Null,
            FieldDefault::Bool(b) => Value::Bool(b),
            FieldDefault::Int(i) => Value::from(i),
        }
    }
}

/// A user-owned field: set by local user action or local enrichment, never
/// reset by a re-sync of an existing row.
#[derive(Debug, Clone, Copy)]
pub struct UserOwnedField {
    pub name: &'static str,
    pub default: FieldDefault,
}

const fn owned(name: &'static str, default: FieldDefault) -> UserOwnedField {
    UserOwnedField { name, default }
}

/// Schema for one entity kind.
#[derive(Debug)]
pub struct KindSchema {
    /// Table name (also the entity kind name in change events).
    pub name: &'static str,
    /// Primary key field, unique within the kind.
    pub primary_key: &'static str,
    /// All columns, including the primary key.
    pub columns: &'static [Column],
    /// Field that scopes rows to a remote source, if any.
    pub source_field: Option<&'static str>,
    /// Fields that decide *changed* vs *unchanged* during reconciliation.
    pub identity_fields: &'static [&'static str],
    /// Fields preserved across re-syncs of the same row.
    pub user_owned: &'static [UserOwnedField],
}

impl KindSchema {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Validate that `name` is a declared column of this kind.
    pub fn require_column(&self, name: &str) -> Result<&Column, StoreError> {
        self.column(name).ok_or_else(|| StoreError::UnknownField {
            kind: self.name,
            field: name.to_string(),
        })
    }
}

/// Live channels, one row per provider stream.
pub static CHANNELS: KindSchema = KindSchema {
    name: "channels",
    primary_key: "stream_id",
    columns: &[
        col("stream_id"),
        col("source_id"),
        json("category_ids"),
        col("name"),
        col("channel_num"),
        boolean("is_favorite"),
        boolean("enabled"),
        col("stream_type"),
        col("stream_icon"),
        col("epg_channel_id"),
        date("added"),
        col("custom_sid"),
        boolean("tv_archive"),
        col("direct_source"),
        col("direct_url"),
        col("xmltv_id"),
        col("series_no"),
        boolean("live"),
    ],
    source_field: Some("source_id"),
    identity_fields: &[
        "name",
        "category_ids",
        "stream_icon",
        "direct_url",
        "epg_channel_id",
    ],
    user_owned: &[
        owned("is_favorite", FieldDefault::Bool(false)),
        owned("enabled", FieldDefault::Bool(true)),
    ],
};

/// Channel/VOD categories.
pub static CATEGORIES: KindSchema = KindSchema {
    name: "categories",
    primary_key: "category_id",
    columns: &[
        col("category_id"),
        col("source_id"),
        col("category_name"),
        col("parent_id"),
        boolean("enabled"),
        col("display_order"),
        col("channel_count"),
        json("filter_words"),
    ],
    source_field: Some("source_id"),
    identity_fields: &["category_name", "parent_id"],
    user_owned: &[
        owned("enabled", FieldDefault::Bool(true)),
        owned("display_order", FieldDefault::Null),
        owned("filter_words", FieldDefault::Null),
    ],
};

/// EPG programs. Synced with replace-by-source semantics, so no identity or
/// user-owned fields.
pub static PROGRAMS: KindSchema = KindSchema {
    name: "programs",
    primary_key: "id",
    columns: &[
        col("id"),
        col("stream_id"),
        col("title"),
        col("description"),
        date("start"),
        date("end"),
        col("source_id"),
    ],
    source_field: Some("source_id"),
    identity_fields: &[],
    user_owned: &[],
};

/// VOD movies.
pub static VOD_MOVIES: KindSchema = KindSchema {
    name: "vod_movies",
    primary_key: "stream_id",
    columns: &[
        col("stream_id"),
        col("source_id"),
        json("category_ids"),
        col("name"),
        boolean("is_favorite"),
        col("tmdb_id"),
        col("imdb_id"),
        date("added"),
        col("backdrop_path"),
        col("popularity"),
        date("match_attempted"),
        col("container_extension"),
        col("rating"),
        col("director"),
        col("year"),
        col("cast"),
        col("plot"),
        col("genre"),
        col("duration_secs"),
        col("duration"),
        col("stream_icon"),
        col("direct_url"),
        date("release_date"),
        col("title"),
    ],
    source_field: Some("source_id"),
    identity_fields: &["name", "category_ids", "stream_icon", "direct_url", "added"],
    user_owned: &[
        owned("is_favorite", FieldDefault::Bool(false)),
        owned("tmdb_id", FieldDefault::Null),
        owned("imdb_id", FieldDefault::Null),
        owned("backdrop_path", FieldDefault::Null),
        owned("popularity", FieldDefault::Null),
        owned("match_attempted", FieldDefault::Null),
    ],
};

/// VOD series.
pub static VOD_SERIES: KindSchema = KindSchema {
    name: "vod_series",
    primary_key: "series_id",
    columns: &[
        col("series_id"),
        col("source_id"),
        json("category_ids"),
        col("name"),
        boolean("is_favorite"),
        col("tmdb_id"),
        col("imdb_id"),
        date("added"),
        col("backdrop_path"),
        col("popularity"),
        date("match_attempted"),
        col("cover"),
        col("plot"),
        col("cast"),
        col("director"),
        col("genre"),
        date("release_date"),
        col("rating"),
        col("rating_5based"),
        col("youtube_trailer"),
        col("episode_run_time"),
        col("title"),
        date("last_modified"),
        col("year"),
        col("stream_type"),
        col("stream_icon"),
        col("direct_url"),
        col("category_id"),
    ],
    source_field: Some("source_id"),
    identity_fields: &[
        "name",
        "category_ids",
        "stream_icon",
        "direct_url",
        "last_modified",
    ],
    user_owned: &[
        owned("is_favorite", FieldDefault::Bool(false)),
        owned("tmdb_id", FieldDefault::Null),
        owned("imdb_id", FieldDefault::Null),
        owned("backdrop_path", FieldDefault::Null),
        owned("popularity", FieldDefault::Null),
        owned("match_attempted", FieldDefault::Null),
    ],
};

/// Per-source sync metadata. Written by the reconciler, never reconciled.
pub static SOURCES_META: KindSchema = KindSchema {
    name: "sources_meta",
    primary_key: "source_id",
    columns: &[
        col("source_id"),
        col("epg_url"),
        date("last_synced"),
        date("vod_last_synced"),
        col("channel_count"),
        col("category_count"),
        col("vod_movie_count"),
        col("vod_series_count"),
        date("expiry_date"),
        col("active_cons"),
        col("max_connections"),
        col("error"),
    ],
    source_field: None,
    identity_fields: &[],
    user_owned: &[],
};

/// All entity kinds the store manages.
pub static KINDS: &[&KindSchema] = &[
    &CHANNELS,
    &CATEGORIES,
    &PROGRAMS,
    &VOD_MOVIES,
    &VOD_SERIES,
    &SOURCES_META,
];

/// Look up a kind schema by name.
pub fn kind(name: &str) -> Result<&'static KindSchema, StoreError> {
    KINDS
        .iter()
        .find(|k| k.name == name)
        .copied()
        .ok_or_else(|| StoreError::UnknownKind(name.to_string()))
}

/// DDL for all tables plus the source-scope indexes reconciliation relies on.
pub(crate) fn ddl() -> String {
    let mut out = String::new();
    for schema in KINDS {
        out.push_str(&format!("CREATE TABLE IF NOT EXISTS \"{}\" (\n", schema.name));
        for (i, column) in schema.columns.iter().enumerate() {
            let constraint = if column.name == schema.primary_key {
                " PRIMARY KEY"
            } else {
                ""
            };
            let comma = if i + 1 < schema.columns.len() { "," } else { "" };
            out.push_str(&format!("    \"{}\"{}{}\n", column.name, constraint, comma));
        }
        out.push_str(");\n");

        if let Some(source_field) = schema.source_field {
            out.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_{1} ON \"{0}\"(\"{1}\");\n",
                schema.name, source_field
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_lookup() {
        assert_eq!(kind("channels").unwrap().primary_key, "stream_id");
        assert!(matches!(
            kind("nope"),
            Err(StoreError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_every_kind_declares_primary_key_column() {
        for schema in KINDS {
            assert!(
                schema.column(schema.primary_key).is_some(),
                "{} is missing its own primary key column",
                schema.name
            );
        }
    }

    #[test]
    fn test_identity_and_user_owned_fields_are_declared_columns() {
        for schema in KINDS {
            for field in schema.identity_fields {
                assert!(schema.column(field).is_some(), "{}.{}", schema.name, field);
            }
            for field in schema.user_owned {
                assert!(
                    schema.column(field.name).is_some(),
                    "{}.{}",
                    schema.name,
                    field.name
                );
            }
        }
    }

    #[test]
    fn test_user_owned_fields_never_include_source_or_identity() {
        for schema in KINDS {
            for field in schema.user_owned {
                assert_ne!(Some(field.name), schema.source_field);
                assert_ne!(field.name, schema.primary_key);
            }
        }
    }

    #[test]
    fn test_ddl_covers_all_kinds() {
        let ddl = ddl();
        for schema in KINDS {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS \"{}\"", schema.name)));
        }
        // Source-scoped kinds get their reconciliation index.
        assert!(ddl.contains("idx_channels_source_id"));
        assert!(ddl.contains("idx_programs_source_id"));
    }

    #[test]
    fn test_require_column_rejects_unknown_field() {
        let err = CHANNELS.require_column("drop table").unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }
}
