use serde::{Deserialize, Deserializer, Serialize};

/// Reads an explicit `null` as the field's default, the same as a missing key.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Artist {
    #[serde(deserialize_with = "nullable")]
    pub mbid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmid: Option<i64>,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub sort_name: String,
    #[serde(deserialize_with = "nullable")]
    pub disambiguation: String,
    #[serde(deserialize_with = "nullable")]
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Coords {
    #[serde(deserialize_with = "nullable")]
    pub lat: f32,
    #[serde(deserialize_with = "nullable")]
    pub long: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Country {
    #[serde(deserialize_with = "nullable")]
    pub code: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct City {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub state: String,
    #[serde(deserialize_with = "nullable")]
    pub state_code: String,
    #[serde(deserialize_with = "nullable")]
    pub coords: Coords,
    #[serde(deserialize_with = "nullable")]
    pub country: Country,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Venue {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub city: City,
    #[serde(deserialize_with = "nullable")]
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Tour {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Song {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// Guest artist who joined for this song.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with: Option<Artist>,
    /// Original artist when the song is a cover.
    #[serde(alias = "artist", skip_serializing_if = "Option::is_none")]
    pub cover: Option<Artist>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Played from tape rather than performed live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tape: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Set {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub encore: u32,
    #[serde(deserialize_with = "nullable")]
    pub song: Vec<Song>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Sets {
    #[serde(deserialize_with = "nullable")]
    pub set: Vec<Set>,
}

/// One performance by one artist at one venue on one date.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Setlist {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub version_id: String,
    /// `dd-MM-yyyy`, as served by setlist.fm.
    #[serde(deserialize_with = "nullable")]
    pub event_date: String,
    #[serde(deserialize_with = "nullable")]
    pub last_updated: String,
    #[serde(deserialize_with = "nullable")]
    pub artist: Artist,
    #[serde(deserialize_with = "nullable")]
    pub venue: Venue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tour: Option<Tour>,
    #[serde(deserialize_with = "nullable")]
    pub sets: Sets,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub url: String,
}

/// A single page of the `attended` listing.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SetlistPage {
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    #[serde(deserialize_with = "nullable")]
    pub items_per_page: u32,
    #[serde(deserialize_with = "nullable")]
    pub page: u32,
    #[serde(deserialize_with = "nullable")]
    pub total: u32,
    #[serde(deserialize_with = "nullable")]
    pub setlist: Vec<Setlist>,
}

/// Flattened row written to `list.json`.
///
/// `tour` and `songs_played` are never populated; they stay in the output
/// so consumers of the existing file shape keep working.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EventSummary {
    pub id: String,
    pub date: String,
    pub venue: String,
    pub city: String,
    pub state: String,
    pub artist: String,
    pub tour: String,
    pub songs_played: u32,
    pub link: String,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct EventList {
    #[serde(rename = "Event")]
    pub events: Vec<EventSummary>,
}
