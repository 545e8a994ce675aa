pub mod api;
pub mod filters;
pub mod movie;
pub mod user;

pub use api::{Envelope, HealthResponse, HealthStatus, JwtView, Page};
pub use filters::{Filters, Metadata, SortDirection};
pub use movie::{
    CreateMovieRequest, Movie, MovieFilter, MovieQuery, Runtime, UpdateMovieRequest,
};
pub use user::{ActivateUserRequest, RegisterUserRequest, User, UserFilter, UserQuery};
