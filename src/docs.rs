use crate::common::response::ErrorBody;
use crate::modules::video::dto::*;
use crate::modules::video::events::JobEvent;
use crate::modules::video::model::{FailureKind, JobState};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::get_status,
        crate::modules::video::handler::list_jobs,
        crate::modules::video::handler::cancel_job,
        crate::modules::video::handler::events,
        crate::modules::video::stream_handler::stream_video,
    ),
    components(
        schemas(
            UploadAcceptedResponse, UploadCompletedResponse, JobStatusResponse,
            JobEvent, JobState, FailureKind, ErrorBody,
        )
    ),
    tags(
        (name = "Video", description = "Upload, HLS transcoding and playback")
    )
)]
pub struct ApiDoc;
