pub mod application;
pub mod client;
pub mod credential;
pub mod login;
pub mod organization;
pub mod role;
pub mod user;

pub use application::{
    Application, ApplicationDetail, ApplicationResponse, CreateApplicationRequest,
    UpdateApplicationRequest,
};
pub use client::{
    Client, ClientDetail, ClientResponse, CreateClientRequest, UpdateClientRequest,
};
pub use credential::{
    CreateCredentialRequest, Credential, CredentialResponse, UpdateCredentialRequest,
};
pub use login::{ClientCredential, LoginRedirect, LoginToken};
pub use organization::{
    CreateOrganizationRequest, Organization, OrganizationResponse, UpdateOrganizationRequest,
};
pub use role::{CreateRoleRequest, Role, RoleResponse, UpdateRoleRequest};
pub use user::{CreateUserRequest, UpdateUserRequest, User, UserDetail, UserResponse};
