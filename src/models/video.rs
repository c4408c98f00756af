use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle of one video-generation attempt.
///
/// `Drafting -> Submitted -> Polling -> Ready | Failed | TimedOut`. Submission
/// failures go straight from `Drafting` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VideoJobState {
    Drafting,
    Submitted,
    Polling,
    Ready,
    Failed,
    TimedOut,
}

impl VideoJobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::TimedOut)
    }

    pub fn can_transition_to(self, next: VideoJobState) -> bool {
        use VideoJobState::*;
        matches!(
            (self, next),
            (Drafting, Submitted)
                | (Drafting, Failed)
                | (Submitted, Polling)
                | (Submitted, Failed)
                | (Polling, Polling)
                | (Polling, Ready)
                | (Polling, Failed)
                | (Polling, TimedOut)
        )
    }
}

/// Avatar/voice choice for a row and the reason it was picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarMapping {
    pub category: Option<String>,
    pub avatar_id: String,
    pub voice_id: String,
    pub duration_secs: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoJob {
    pub job_id: String,
    pub script: String,
    pub mapping: AvatarMapping,
    pub provider_job_id: Option<String>,
    pub state: VideoJobState,
    pub video_url: Option<String>,
    pub failure: Option<String>,
    pub polls: u32,
}

impl VideoJob {
    pub fn draft(job_id: impl Into<String>, script: impl Into<String>, mapping: AvatarMapping) -> Self {
        Self {
            job_id: job_id.into(),
            script: script.into(),
            mapping,
            provider_job_id: None,
            state: VideoJobState::Drafting,
            video_url: None,
            failure: None,
            polls: 0,
        }
    }

    fn transition(&mut self, next: VideoJobState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal video job transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    pub fn mark_submitted(&mut self, provider_job_id: impl Into<String>) {
        self.provider_job_id = Some(provider_job_id.into());
        self.transition(VideoJobState::Submitted);
    }

    pub fn record_poll(&mut self) {
        self.polls += 1;
        self.transition(VideoJobState::Polling);
    }

    /// `url` must be non-empty; callers turn an empty URL into a failure.
    pub fn mark_ready(&mut self, url: impl Into<String>) {
        self.video_url = Some(url.into());
        self.transition(VideoJobState::Ready);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.transition(VideoJobState::Failed);
    }

    pub fn mark_timed_out(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.transition(VideoJobState::TimedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> AvatarMapping {
        AvatarMapping {
            category: None,
            avatar_id: "avatar".into(),
            voice_id: "voice".into(),
            duration_secs: 30,
            reason: "default".into(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = VideoJob::draft("J1", "script", mapping());
        assert_eq!(job.state, VideoJobState::Drafting);

        job.mark_submitted("prov-1");
        assert_eq!(job.state, VideoJobState::Submitted);

        job.record_poll();
        job.record_poll();
        assert_eq!(job.state, VideoJobState::Polling);
        assert_eq!(job.polls, 2);

        job.mark_ready("https://cdn/video.mp4");
        assert_eq!(job.state, VideoJobState::Ready);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [VideoJobState::Ready, VideoJobState::Failed, VideoJobState::TimedOut] {
            assert!(terminal.is_terminal());
            for next in [
                VideoJobState::Drafting,
                VideoJobState::Submitted,
                VideoJobState::Polling,
                VideoJobState::Ready,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_cannot_skip_polling() {
        assert!(!VideoJobState::Submitted.can_transition_to(VideoJobState::Ready));
        assert!(!VideoJobState::Drafting.can_transition_to(VideoJobState::Polling));
    }
}
