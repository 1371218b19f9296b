use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::http::HeaderMap;
use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const ROLES_HEADER: &str = "x-roles";

/// The caller, as identified by the upstream gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub organizations: Vec<Uuid>,
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            organizations: vec![],
            roles: vec![],
        }
    }

    pub fn new_system_user() -> Self {
        Self {
            id: Uuid::new_v4(),
            organizations: vec![],
            roles: vec!["system".into()],
        }
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organizations.push(organization_id);
        self
    }

    /// The organization new jobs are created under.
    pub fn primary_organization(&self) -> Option<Uuid> {
        self.organizations.first().copied()
    }

    fn is_same_user(&self, id: Uuid) -> bool {
        self.id == id
    }

    fn belongs_to(&self, organization_id: Uuid) -> bool {
        self.organizations.contains(&organization_id)
    }

    fn has_organization(&self) -> bool {
        !self.organizations.is_empty()
    }

    fn has_role(&self, role: String) -> bool {
        self.roles.iter().any(|x| x == &role)
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, Error> {
        let id = header(headers, USER_ID_HEADER)
            .ok_or_else(|| Error::new(ErrorKind::NotOwner, "missing caller identity"))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| Error::invalid_input_error("x-user-id must be a uuid"))?;

        let mut organizations = vec![];
        if let Some(value) = header(headers, ORGANIZATION_ID_HEADER) {
            for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let organization_id = Uuid::parse_str(part).map_err(|_| {
                    Error::invalid_input_error("x-organization-id must be a uuid")
                })?;
                organizations.push(organization_id);
            }
        }

        let roles = header(headers, ROLES_HEADER)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            organizations,
            roles,
        })
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[async_trait]
impl<B> FromRequest<B> for User
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        User::from_headers(req.headers())
    }
}

impl PolarClass for User {
    fn get_polar_class_builder() -> oso::ClassBuilder<User> {
        oso::Class::builder()
            .name("User")
            .add_attribute_getter("id", |recv: &User| recv.id)
            .add_attribute_getter("roles", |recv: &User| recv.roles.clone())
            .add_method("is_same_user", User::is_same_user)
            .add_method("belongs_to", User::belongs_to)
            .add_method("has_organization", User::has_organization)
            .add_method("has_role", User::has_role)
    }

    fn get_polar_class() -> oso::Class {
        let builder = User::get_polar_class_builder();
        builder.build()
    }
}
