use serde::{Deserialize, Serialize};

/// One streamer (virtual host) profile as persisted in the YAML store
///
/// Serialized key names match the existing data files and front-end, so
/// several fields are renamed. Every field defaults, which lets older
/// documents and partial request bodies deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileRecord {
    /// Store-assigned identifier, unique across records
    pub id: u64,
    /// Display name
    pub name: String,
    /// Character tags shown on the streamer card
    #[serde(rename = "character")]
    pub character_tags: Vec<String>,
    /// Free-form value proposition
    pub value: String,
    /// Avatar image path
    #[serde(rename = "avater")]
    pub avatar_path: String,
    /// Voice model weight tag
    pub tts_weight_tag: String,
    /// Voice style tag
    pub tts_tag: String,
    /// Reference sentence for voice cloning
    pub tts_reference_sentence: String,
    /// Reference audio path for voice cloning
    pub tts_reference_audio: String,
    /// Poster image path
    #[serde(rename = "poster_image")]
    pub poster_image_path: String,
    /// Base video for the digital human
    #[serde(rename = "base_mp4_path")]
    pub base_video_path: String,
    /// Soft-delete marker
    #[serde(rename = "delete")]
    pub deleted: bool,
}

impl ProfileRecord {
    /// Empty record handed out when nothing is selected or the id is unknown
    pub fn placeholder() -> Self {
        Self {
            character_tags: vec![String::new()],
            ..Default::default()
        }
    }
}

/// Request body carrying a single streamer id
///
/// Clients may send any integer; ids the store can never hold (negative
/// ones) simply match nothing.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamerIdRequest {
    pub streamer_id: i64,
}

impl StreamerIdRequest {
    /// The id as stored, or `None` when no record can have it
    pub fn stored_id(&self) -> Option<u64> {
        u64::try_from(self.streamer_id).ok()
    }
}

/// Outcome code carried in every response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    Fail,
}

/// Uniform response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: ResultCode,
    pub message: String,
    pub data: T,
}

pub const SUCCESS_MESSAGE: &str = "成功";
pub const FAIL_MESSAGE: &str = "失败";

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: ResultCode::Success,
            message: SUCCESS_MESSAGE.to_string(),
            data,
        }
    }

    pub fn fail(data: T) -> Self {
        Self {
            success: false,
            code: ResultCode::Fail,
            message: FAIL_MESSAGE.to_string(),
            data,
        }
    }
}
