//! Shared fakes for integration tests.
#![allow(dead_code)]

use anyhow::anyhow;
use poi_ingest::geo::{GeoValidator, Geocoder, PlaceHit, ReverseGeocode, SearchBias};
use poi_ingest::model::{ModelRequest, ModelResponse, ModelService, RequestExecutor, ServiceFailure};
use poi_ingest::report::CollectingReporter;
use poi_ingest::review::ReviewStore;
use poi_ingest::store::PlaceStore;
use poi_ingest::util::RecordingSleeper;
use poi_ingest::Orchestrator;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

pub const MOSTAR: (f64, f64) = (43.3438, 17.8078);
pub const TUZLA: (f64, f64) = (44.5384, 18.6671);
pub const BANJA_LUKA: (f64, f64) = (44.7722, 17.1910);
pub const BELGRADE: (f64, f64) = (44.8200, 20.4500);

/// Model service that replays a fixed script.
pub struct ScriptedModel {
    script: RefCell<VecDeque<Result<ModelResponse, ServiceFailure>>>,
    pub calls: Rc<Cell<usize>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<ModelResponse, ServiceFailure>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn text(body: &str) -> Self {
        Self::new(vec![Ok(ModelResponse::Text(body.to_string()))])
    }
}

impl ModelService for ScriptedModel {
    fn generate(&self, _request: &ModelRequest) -> Result<ModelResponse, ServiceFailure> {
        self.calls.set(self.calls.get() + 1);
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceFailure::Other("script exhausted".to_string())))
    }
}

/// How the fake geocoder answers reverse lookups.
#[derive(Clone)]
pub enum GeocodeAnswer {
    City(&'static str),
    AddressOnly,
    Nothing,
    Error,
}

pub struct FakeGeocoder {
    answer: GeocodeAnswer,
    pub calls: Rc<Cell<usize>>,
}

impl FakeGeocoder {
    pub fn new(answer: GeocodeAnswer) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Self {
                answer,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl Geocoder for FakeGeocoder {
    fn name(&self) -> &str {
        "fake"
    }

    fn reverse_geocode(&self, _lat: f64, _lng: f64) -> anyhow::Result<Option<ReverseGeocode>> {
        self.calls.set(self.calls.get() + 1);
        match &self.answer {
            GeocodeAnswer::City(city) => Ok(Some(ReverseGeocode {
                city: Some(city.to_string()),
                ..Default::default()
            })),
            GeocodeAnswer::AddressOnly => Ok(Some(ReverseGeocode {
                formatted: Some("Bosnia and Herzegovina".to_string()),
                ..Default::default()
            })),
            GeocodeAnswer::Nothing => Ok(None),
            GeocodeAnswer::Error => Err(anyhow!("geocoder unavailable")),
        }
    }

    fn text_search(&self, _query: &str, _bias: Option<SearchBias>) -> anyhow::Result<Vec<PlaceHit>> {
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator<ScriptedModel>,
    pub reporter: Arc<CollectingReporter>,
    pub sleeper: RecordingSleeper,
    pub geocoder_calls: Rc<Cell<usize>>,
}

pub fn harness(
    model: ScriptedModel,
    answer: GeocodeAnswer,
    strict: bool,
    places: Box<dyn PlaceStore>,
    reviews: Box<dyn ReviewStore>,
) -> Harness {
    let reporter = Arc::new(CollectingReporter::new());
    let sleeper = RecordingSleeper::new();
    let (geocoder, geocoder_calls) = FakeGeocoder::new(answer);
    let executor = RequestExecutor::new(model, Box::new(sleeper.clone()), reporter.clone());
    let validator = GeoValidator::new(Some(Box::new(geocoder)), None, strict);
    let orchestrator = Orchestrator::new(executor, validator, places, reviews, reporter.clone());
    Harness {
        orchestrator,
        reporter,
        sleeper,
        geocoder_calls,
    }
}
