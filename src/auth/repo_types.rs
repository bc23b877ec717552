use serde::{de, Deserialize, Deserializer, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use uuid::Uuid;

/// User record in the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String, // Argon2 digest, never sent to clients
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(
        serialize_with = "time::serde::rfc3339::serialize",
        deserialize_with = "store_timestamp"
    )]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        serialize_with = "time::serde::rfc3339::option::serialize",
        deserialize_with = "optional_store_timestamp"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// Fields supplied when inserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub password_hash: String,
}

/// Accepts RFC 3339 and zone-less `timestamp` columns; the latter are UTC.
fn parse_store_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim().replacen(' ', "T", 1);
    if let Ok(t) = OffsetDateTime::parse(&raw, &Rfc3339) {
        return Some(t);
    }
    let naive = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(&raw, naive)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

fn store_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_store_timestamp(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn optional_store_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_store_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn user_json(created_at: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "email": "a@x.com",
            "username": "alice",
            "full_name": "Alice A",
            "password_hash": "$argon2id$...",
            "created_at": created_at,
            "updated_at": null
        })
    }

    #[test]
    fn reads_timestamptz_and_zoneless_columns() {
        let with_zone: UserRecord =
            serde_json::from_value(user_json("2024-01-02T03:04:05.5+03:00")).unwrap();
        assert_eq!(with_zone.created_at, datetime!(2024-01-02 00:04:05.5 UTC));

        let zoneless: UserRecord =
            serde_json::from_value(user_json("2024-01-02T03:04:05.123456")).unwrap();
        assert_eq!(zoneless.created_at, datetime!(2024-01-02 03:04:05.123456 UTC));
        assert_eq!(zoneless.updated_at, None);

        let whole_seconds: UserRecord =
            serde_json::from_value(user_json("2024-01-02 03:04:05")).unwrap();
        assert_eq!(whole_seconds.created_at, datetime!(2024-01-02 03:04:05 UTC));
    }

    #[test]
    fn garbage_timestamp_is_an_error() {
        assert!(serde_json::from_value::<UserRecord>(user_json("yesterday")).is_err());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let user: UserRecord =
            serde_json::from_value(user_json("2024-01-02T03:04:05Z")).unwrap();
        let out = serde_json::to_value(&user).unwrap();
        assert!(out.get("password_hash").is_none());
        assert_eq!(out["created_at"], "2024-01-02T03:04:05Z");
    }
}
