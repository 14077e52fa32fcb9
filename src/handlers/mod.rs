pub mod form;
pub mod health;
pub mod inference;

pub use form::{index, predict_form, FormPage, ResultPage};
pub use health::{health_check, HealthResponse};
pub use inference::{predict, predict_proba, PredictResponse, ProbaResponse};
