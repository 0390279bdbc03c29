//! Declarative catalog of the backend endpoints.

use reqwest::Method;

use crate::{ConsultKitError, ConsultKitResult};

/// Identifies an entry of the endpoint catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum EndpointId {
    /// Password grant.
    Login,
    /// Refresh-token grant.
    RefreshToken,
    /// Practitioner profile of the logged-in user.
    UserProfile,
    /// Patients of the practice.
    ListPatients,
    /// Registers a patient. Answers 409 on a suspected duplicate.
    CreatePatient,
    /// One patient, by `{id}`.
    GetPatient,
    /// Partial update of a patient, by `{id}`.
    UpdatePatient,
    /// Consultations of the practice.
    ListConsultations,
    /// Moves a consultation, by `{id}`, to another status.
    UpdateConsultationStatus,
}

/// Body encoding of non-GET requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
}

impl ContentType {
    /// MIME type sent in `Content-Type`.
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Form => "application/x-www-form-urlencoded",
        }
    }
}

/// How to call one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    /// Catalog entry this descriptor belongs to.
    pub id: EndpointId,
    /// Path relative to the API base URL; `{name}` segments are route arguments.
    pub path: &'static str,
    /// HTTP method.
    pub method: Method,
    /// Body encoding of non-GET requests.
    pub content_type: ContentType,
    /// Whether the session's `Authorization` header is attached.
    pub requires_auth: bool,
    /// Headers sent on every call.
    pub headers: &'static [(&'static str, &'static str)],
    /// JSON body fields sent as `null` instead of being omitted.
    pub explicit_null_fields: &'static [&'static str],
}

impl EndpointDescriptor {
    /// Whether the request can safely be repeated.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        self.method.is_idempotent()
    }
}

const ACCEPT_JSON: &[(&str, &str)] = &[("Accept", "application/json")];

const fn api(
    id: EndpointId,
    path: &'static str,
    method: Method,
    explicit_null_fields: &'static [&'static str],
) -> EndpointDescriptor {
    EndpointDescriptor {
        id,
        path,
        method,
        content_type: ContentType::Json,
        requires_auth: true,
        headers: ACCEPT_JSON,
        explicit_null_fields,
    }
}

const fn token_grant(id: EndpointId) -> EndpointDescriptor {
    EndpointDescriptor {
        id,
        path: "oauth2/token",
        method: Method::POST,
        content_type: ContentType::Form,
        requires_auth: false,
        headers: ACCEPT_JSON,
        explicit_null_fields: &[],
    }
}

// Indexed by `EndpointId` discriminant.
static CATALOG: [EndpointDescriptor; 9] = [
    token_grant(EndpointId::Login),
    token_grant(EndpointId::RefreshToken),
    api(EndpointId::UserProfile, "practice/profile", Method::GET, &[]),
    api(EndpointId::ListPatients, "patient/patients", Method::GET, &[]),
    api(EndpointId::CreatePatient, "patient/patients", Method::POST, &[]),
    api(EndpointId::GetPatient, "patient/patients/{id}", Method::GET, &[]),
    api(
        EndpointId::UpdatePatient,
        "patient/patients/{id}",
        Method::PATCH,
        &["notes", "email", "phone"],
    ),
    api(EndpointId::ListConsultations, "patient/consultations", Method::GET, &[]),
    api(
        EndpointId::UpdateConsultationStatus,
        "patient/consultations/{id}",
        Method::PATCH,
        &[],
    ),
];

impl EndpointId {
    /// All catalog entries.
    pub const ALL: [Self; 9] = [
        Self::Login,
        Self::RefreshToken,
        Self::UserProfile,
        Self::ListPatients,
        Self::CreatePatient,
        Self::GetPatient,
        Self::UpdatePatient,
        Self::ListConsultations,
        Self::UpdateConsultationStatus,
    ];

    /// The catalog entry for this endpoint.
    #[must_use]
    pub fn descriptor(self) -> &'static EndpointDescriptor {
        &CATALOG[self as usize]
    }
}

/// An endpoint plus the values of its `{name}` path arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    endpoint: EndpointId,
    args: Vec<(String, String)>,
}

impl Route {
    /// Route without arguments.
    #[must_use]
    pub const fn new(endpoint: EndpointId) -> Self {
        Self {
            endpoint,
            args: Vec::new(),
        }
    }

    /// Adds the value of `{name}`.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((name.into(), value.to_string()));
        self
    }

    /// Endpoint of this route.
    #[must_use]
    pub const fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Catalog entry of this route's endpoint.
    #[must_use]
    pub fn descriptor(&self) -> &'static EndpointDescriptor {
        self.endpoint.descriptor()
    }

    /// Path with every argument substituted (percent-encoded).
    ///
    /// # Errors
    /// Returns [`ConsultKitError::InvalidInput`] if an argument is missing.
    pub fn path(&self) -> ConsultKitResult<String> {
        let mut path = self.descriptor().path.to_string();
        for (name, value) in &self.args {
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }
        match path.find('{') {
            Some(start) => {
                let missing = path[start..].split('}').next().unwrap_or_default();
                Err(ConsultKitError::invalid_input(
                    "path_args",
                    format!("missing value for `{missing}}}`"),
                ))
            }
            None => Ok(path),
        }
    }
}

impl From<EndpointId> for Route {
    fn from(endpoint: EndpointId) -> Self {
        Self::new(endpoint)
    }
}
