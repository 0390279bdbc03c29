use crate::session::{Profile, Token};
use crate::{ConsultKitError, ConsultKitResult};

/// Hosted web page that can be opened in an authenticated web view.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum WebSurface {
    /// Live consultation workspace.
    ConsultationSession {
        /// Consultation identifier.
        consultation_id: u64,
        /// Tab to open first.
        active_tab: Option<String>,
        /// Resume an interrupted session instead of starting over.
        resume: bool,
    },
    /// Read-only summary of a finished consultation.
    ConsultationSummary {
        /// Consultation identifier.
        consultation_id: u64,
    },
}

/// Device details forwarded to the web surfaces.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct DeviceInfo {
    /// `ios` or `android`.
    pub platform: String,
    /// OS version string.
    pub os_version: String,
    /// `phone` or `tablet`.
    pub idiom: String,
}

impl WebSurface {
    fn path(&self) -> String {
        match self {
            Self::ConsultationSession {
                consultation_id, ..
            } => format!("consultations/{consultation_id}/session"),
            Self::ConsultationSummary { consultation_id } => {
                format!("consultations/{consultation_id}/summary")
            }
        }
    }

    fn extra_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::ConsultationSession {
                active_tab, resume, ..
            } => {
                let mut params = Vec::with_capacity(2);
                if let Some(tab) = active_tab {
                    params.push(("tab", tab.clone()));
                }
                params.push(("resume", resume.to_string()));
                params
            }
            Self::ConsultationSummary { .. } => Vec::new(),
        }
    }

    /// URL of this surface under `web_base_url` (which ends with `/`), carrying
    /// the session handoff parameters.
    ///
    /// # Errors
    /// Returns [`ConsultKitError::AuthExpired`] if `token` is expired at `now`.
    pub fn url(
        &self,
        web_base_url: &str,
        token: &Token,
        profile: Option<&Profile>,
        device: &DeviceInfo,
        now: u64,
    ) -> ConsultKitResult<String> {
        if token.is_expired(now) {
            return Err(ConsultKitError::AuthExpired {
                reason: "token expired before opening the web view".to_string(),
            });
        }

        let mut params = vec![
            ("access_token", token.access_token.clone()),
            ("expires_in", token.expires_in_seconds.to_string()),
            ("issued_at", token.issued_at.to_string()),
            ("role", profile.map(|p| p.role.clone()).unwrap_or_default()),
            (
                "is_premium",
                profile.is_some_and(|p| p.is_premium).to_string(),
            ),
            ("platform", device.platform.clone()),
            ("os_version", device.os_version.clone()),
            ("idiom", device.idiom.clone()),
            ("t", now.to_string()),
        ];
        params.extend(self.extra_params());

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        Ok(format!("{web_base_url}{}?{query}", self.path()))
    }
}
