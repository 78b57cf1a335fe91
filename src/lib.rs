pub mod parser;
pub mod scraper;
pub mod table;
pub mod types;

pub use scraper::WebScraper;
pub use table::DataTable;
pub use types::{FilterSet, Record, ScrapeResult};

pub(crate) const BASE_URL: &str = "https://pulepapp.mincultura.gov.co";
pub(crate) const EVENTS_PATH: &str = "/InformesPublicos/Eventos";
pub(crate) const EVENTS_GRID_PATH: &str = "/InformesPublicos/ObtenerEventos";
pub(crate) const EVENT_DETAIL_PATH: &str = "/InformesPublicos/EventoFichap";
