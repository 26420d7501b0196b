use crate::models::request_params::FetchParams;

/// Builds the `GET /source` query. Non-positive `limit`/`since` are left out so the
/// upstream applies its own defaults.
pub fn construct_params(params: &FetchParams) -> Vec<(String, String)> {
    let mut query = vec![("name".to_string(), params.source.clone())];
    if params.limit > 0 {
        query.push(("limit".to_string(), params.limit.to_string()));
    }
    if params.since > 0 {
        query.push(("since".to_string(), params.since.to_string()));
    }
    query
}
