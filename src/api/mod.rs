//! Read side: paging rules, the read service and its JSON routes.

mod http;
mod pagination;
mod service;

pub use http::{router, serve};
pub use pagination::{paginate, Filters, Metadata, DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
pub use service::{NewsList, NewsService, ReadError};
