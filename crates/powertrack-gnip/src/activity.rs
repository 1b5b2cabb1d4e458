//! Activity-streams tweet → CSV row projection
//!
//! Columns are the flattened activity fields in sorted name order. A tweet
//! without a usable location (`the_geom`) is skipped: either the tweet's own
//! `geo` point, or a point-typed `gnip.profileLocations[0].geo`.

use powertrack_core::{Row, RowCodec};
use serde_json::Value;

/// How a column's value is rendered and what it defaults to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    /// Plain text, default ""
    Text,
    /// Integer count, default "0"
    Count,
    /// Boolean, default "false"
    Flag,
    /// Re-serialized JSON, default ""
    Json,
    /// The tweet's `geo` with coordinates in GeoJSON order
    Geo,
    /// Derived point geometry; absence skips the record
    TheGeom,
}

#[derive(Clone, Copy, Debug)]
struct Column {
    name: &'static str,
    parent: Option<&'static str>,
    key: &'static str,
    kind: Kind,
}

const fn col(name: &'static str, parent: Option<&'static str>, key: &'static str, kind: Kind) -> Column {
    Column {
        name,
        parent,
        key,
        kind,
    }
}

const ACTOR: Option<&str> = Some("actor");
const CATEGORY: Option<&str> = Some("category");
const GENERATOR: Option<&str> = Some("generator");
const LOCATION: Option<&str> = Some("location");
const OBJECT: Option<&str> = Some("object");
const PROVIDER: Option<&str> = Some("provider");

/// All columns, sorted by name
const COLUMNS: &[Column] = &[
    col("actor_displayname", ACTOR, "displayName", Kind::Text),
    col("actor_followerscount", ACTOR, "followersCount", Kind::Count),
    col("actor_friendscount", ACTOR, "friendsCount", Kind::Count),
    col("actor_id", ACTOR, "id", Kind::Text),
    col("actor_image", ACTOR, "image", Kind::Text),
    col("actor_languages", ACTOR, "languages", Kind::Json),
    col("actor_link", ACTOR, "link", Kind::Text),
    col("actor_links", ACTOR, "links", Kind::Json),
    col("actor_listedcount", ACTOR, "listedCount", Kind::Count),
    col("actor_location", ACTOR, "location", Kind::Json),
    col("actor_objecttype", ACTOR, "objectType", Kind::Text),
    col("actor_postedtime", ACTOR, "postedTime", Kind::Text),
    col("actor_preferredusername", ACTOR, "preferredUsername", Kind::Text),
    col("actor_statusescount", ACTOR, "statusesCount", Kind::Count),
    col("actor_summary", ACTOR, "summary", Kind::Text),
    col("actor_twittertimezone", ACTOR, "twitterTimeZone", Kind::Text),
    col("actor_utcoffset", ACTOR, "utcOffset", Kind::Count),
    col("actor_verified", ACTOR, "verified", Kind::Flag),
    col("body", None, "body", Kind::Text),
    col("category_name", CATEGORY, "name", Kind::Text),
    col("category_terms", CATEGORY, "terms", Kind::Text),
    col("favoritescount", None, "favoritesCount", Kind::Count),
    col("generator_displayname", GENERATOR, "displayName", Kind::Text),
    col("generator_link", GENERATOR, "link", Kind::Text),
    col("geo", None, "geo", Kind::Geo),
    col("gnip", None, "gnip", Kind::Json),
    col("id", None, "id", Kind::Text),
    col("inreplyto_link", None, "inReplyTo", Kind::Json),
    col("link", None, "link", Kind::Text),
    col("location_displayname", LOCATION, "displayName", Kind::Text),
    col("location_geo", LOCATION, "geo", Kind::Json),
    col("location_link", LOCATION, "link", Kind::Text),
    col("location_name", LOCATION, "name", Kind::Text),
    col("location_objecttype", LOCATION, "objectType", Kind::Text),
    col("location_streetaddress", LOCATION, "streetAddress", Kind::Text),
    col("object_id", OBJECT, "id", Kind::Text),
    col("object_link", OBJECT, "link", Kind::Text),
    col("object_objecttype", OBJECT, "objectType", Kind::Text),
    col("object_postedtime", OBJECT, "postedTime", Kind::Text),
    col("object_summary", OBJECT, "summary", Kind::Text),
    col("object_type", None, "objectType", Kind::Text),
    col("postedtime", None, "postedTime", Kind::Text),
    col("provider_displayname", PROVIDER, "displayName", Kind::Text),
    col("provider_link", PROVIDER, "link", Kind::Text),
    col("provider_objecttype", PROVIDER, "objectType", Kind::Text),
    col("retweetcount", None, "retweetCount", Kind::Count),
    col("the_geom", None, "the_geom", Kind::TheGeom),
    col("twitter_entities", None, "twitter_entities", Kind::Json),
    col("twitter_filter_level", None, "twitter_filter_level", Kind::Text),
    col("twitter_lang", None, "twitter_lang", Kind::Text),
    col("verb", None, "verb", Kind::Text),
];

/// Requested column name that the codec does not produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownColumn(pub String);

impl std::fmt::Display for UnknownColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown column: {}", self.0)
    }
}

impl std::error::Error for UnknownColumn {}

/// Row codec for GNIP activity-streams tweets
#[derive(Debug, Clone)]
pub struct ActivityCodec {
    columns: Vec<Column>,
}

impl Default for ActivityCodec {
    fn default() -> Self {
        Self {
            columns: COLUMNS.to_vec(),
        }
    }
}

impl ActivityCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict output to `names`, in the given order
    pub fn with_columns<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownColumn> {
        let columns = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                COLUMNS
                    .iter()
                    .find(|c| c.name == name)
                    .copied()
                    .ok_or_else(|| UnknownColumn(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns })
    }

    /// Every column name this codec knows, sorted
    pub fn all_columns() -> impl Iterator<Item = &'static str> {
        COLUMNS.iter().map(|c| c.name)
    }
}

impl RowCodec for ActivityCodec {
    fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.to_string()).collect()
    }

    fn to_row(&self, tweet: &Value) -> Option<Row> {
        let the_geom = the_geom(tweet)?;
        let geo = fixed_geo(tweet);

        let row = self
            .columns
            .iter()
            .map(|column| match column.kind {
                Kind::TheGeom => the_geom.to_string(),
                Kind::Geo => geo.as_ref().map(Value::to_string).unwrap_or_default(),
                _ => {
                    let obj = match column.parent {
                        Some(parent) => tweet.get(parent),
                        None => Some(tweet),
                    };
                    render(obj.and_then(|o| o.get(column.key)), column.kind)
                }
            })
            .collect();
        Some(row)
    }
}

fn render(value: Option<&Value>, kind: Kind) -> String {
    match (value, kind) {
        (None | Some(Value::Null), Kind::Count) => "0".to_string(),
        (None | Some(Value::Null), Kind::Flag) => "false".to_string(),
        (None | Some(Value::Null), _) => String::new(),
        (Some(Value::String(s)), Kind::Text | Kind::Count) => s.clone(),
        (Some(v), _) => v.to_string(),
    }
}

/// The tweet's `geo`, with Twitter's `[lat, lon]` swapped to GeoJSON `[lon, lat]`
fn fixed_geo(tweet: &Value) -> Option<Value> {
    let geo = tweet.get("geo").filter(|g| !g.is_null())?;
    let mut fixed = geo.clone();
    if let Some(coords) = fixed.get_mut("coordinates").and_then(Value::as_array_mut) {
        if coords.len() >= 2 {
            coords.swap(0, 1);
        }
    }
    Some(fixed)
}

/// Point geometry for the record: exact tweet location, else profile location
fn the_geom(tweet: &Value) -> Option<Value> {
    if let Some(geo) = fixed_geo(tweet) {
        return Some(geo);
    }
    let profile = tweet.pointer("/gnip/profileLocations/0/geo")?;
    match profile.get("type").and_then(Value::as_str) {
        Some("point" | "Point") => Some(profile.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tweet_with_geo() -> Value {
        json!({
            "id": "tag:search.twitter.com,2005:1",
            "body": "hello, world",
            "verb": "post",
            "postedTime": "2015-03-01T10:00:00.000Z",
            "retweetCount": 3,
            "geo": {"type": "Point", "coordinates": [40.4, -3.7]},
            "actor": {
                "displayName": "Someone",
                "followersCount": 42,
                "verified": true,
                "languages": ["es", "en"]
            },
            "twitter_entities": {"hashtags": []}
        })
    }

    fn value_of(codec: &ActivityCodec, row: &Row, name: &str) -> String {
        let idx = codec.header().iter().position(|h| h == name).unwrap();
        row[idx].clone()
    }

    #[test]
    fn header_sorted_and_complete() {
        let header = ActivityCodec::new().header();
        let mut sorted = header.clone();
        sorted.sort();
        assert_eq!(header, sorted);
        assert_eq!(header.len(), 51);
        assert!(header.contains(&"the_geom".to_string()));
    }

    #[test]
    fn row_matches_header_width() {
        let codec = ActivityCodec::new();
        let row = codec.to_row(&tweet_with_geo()).unwrap();
        assert_eq!(row.len(), codec.header().len());
    }

    #[test]
    fn geo_coordinates_swapped() {
        let codec = ActivityCodec::new();
        let row = codec.to_row(&tweet_with_geo()).unwrap();
        let expected = r#"{"coordinates":[-3.7,40.4],"type":"Point"}"#;
        assert_eq!(value_of(&codec, &row, "the_geom"), expected);
        assert_eq!(value_of(&codec, &row, "geo"), expected);
    }

    #[test]
    fn fields_rendered_by_kind() {
        let codec = ActivityCodec::new();
        let row = codec.to_row(&tweet_with_geo()).unwrap();
        assert_eq!(value_of(&codec, &row, "body"), "hello, world");
        assert_eq!(value_of(&codec, &row, "actor_followerscount"), "42");
        assert_eq!(value_of(&codec, &row, "actor_verified"), "true");
        assert_eq!(value_of(&codec, &row, "actor_languages"), r#"["es","en"]"#);
        assert_eq!(value_of(&codec, &row, "retweetcount"), "3");
        assert_eq!(value_of(&codec, &row, "twitter_entities"), r#"{"hashtags":[]}"#);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let codec = ActivityCodec::new();
        let row = codec.to_row(&tweet_with_geo()).unwrap();
        assert_eq!(value_of(&codec, &row, "favoritescount"), "0");
        assert_eq!(value_of(&codec, &row, "actor_friendscount"), "0");
        assert_eq!(value_of(&codec, &row, "location_name"), "");
        assert_eq!(value_of(&codec, &row, "gnip"), "");
        assert_eq!(value_of(&codec, &row, "provider_link"), "");
    }

    #[test]
    fn null_fields_use_defaults() {
        let mut tweet = tweet_with_geo();
        tweet["actor"]["verified"] = Value::Null;
        tweet["favoritesCount"] = Value::Null;
        let codec = ActivityCodec::new();
        let row = codec.to_row(&tweet).unwrap();
        assert_eq!(value_of(&codec, &row, "actor_verified"), "false");
        assert_eq!(value_of(&codec, &row, "favoritescount"), "0");
    }

    #[test]
    fn profile_point_location_accepted() {
        let tweet = json!({
            "id": "2",
            "gnip": {"profileLocations": [{"geo": {"type": "point", "coordinates": [-3.7, 40.4]}}]}
        });
        let codec = ActivityCodec::new();
        let row = codec.to_row(&tweet).unwrap();
        assert_eq!(
            value_of(&codec, &row, "the_geom"),
            r#"{"coordinates":[-3.7,40.4],"type":"point"}"#
        );
        assert_eq!(value_of(&codec, &row, "geo"), "");
    }

    #[test]
    fn profile_polygon_skipped() {
        let tweet = json!({
            "id": "3",
            "gnip": {"profileLocations": [{"geo": {"type": "Polygon", "coordinates": []}}]}
        });
        assert!(ActivityCodec::new().to_row(&tweet).is_none());
    }

    #[test]
    fn no_location_skipped() {
        let codec = ActivityCodec::new();
        assert!(codec.to_row(&json!({"id": "4", "body": "x"})).is_none());
        assert!(codec.to_row(&json!({"id": "5", "geo": null})).is_none());
        assert!(codec.to_row(&json!({"gnip": {"profileLocations": []}})).is_none());
    }

    #[test]
    fn replay_trailer_skipped() {
        let trailer = json!({"info": {"message": "Replay Request Completed", "sent": "x", "activity_count": 10}});
        assert!(ActivityCodec::new().to_row(&trailer).is_none());
    }

    #[test]
    fn column_projection() {
        let codec = ActivityCodec::with_columns(&["id", "the_geom", "body"]).unwrap();
        assert_eq!(codec.header(), vec!["id", "the_geom", "body"]);
        let row = codec.to_row(&tweet_with_geo()).unwrap();
        assert_eq!(row[0], "tag:search.twitter.com,2005:1");
        assert_eq!(row[2], "hello, world");
    }

    #[test]
    fn projection_still_requires_location() {
        let codec = ActivityCodec::with_columns(&["id"]).unwrap();
        assert!(codec.to_row(&json!({"id": "6"})).is_none());
    }

    #[test]
    fn unknown_column_rejected() {
        let err = ActivityCodec::with_columns(&["id", "nope"]).unwrap_err();
        assert_eq!(err, UnknownColumn("nope".to_string()));
    }
}
