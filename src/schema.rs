/// Columns the churn pipeline was fitted on, in training order.
///
/// The first 19 are raw customer attributes; the last 6 are engineered
/// features computed upstream and expected to arrive already populated
/// (or absent) in request payloads.
pub const EXPECTED_COLUMNS: [&str; 25] = [
    "gender",
    "SeniorCitizen",
    "Partner",
    "Dependents",
    "tenure",
    "PhoneService",
    "MultipleLines",
    "InternetService",
    "OnlineSecurity",
    "OnlineBackup",
    "DeviceProtection",
    "TechSupport",
    "StreamingTV",
    "StreamingMovies",
    "Contract",
    "PaperlessBilling",
    "PaymentMethod",
    "MonthlyCharges",
    "TotalCharges",
    // engineered
    "tenure_group",
    "avg_monthly_spend",
    "has_fiber",
    "num_addons",
    "auto_payment",
    "has_streaming",
];

/// Form fields coerced to numbers before inference. Values that fail to
/// parse become 0.
pub const FORM_NUMERIC_COLUMNS: [&str; 9] = [
    "tenure",
    "MonthlyCharges",
    "TotalCharges",
    "avg_monthly_spend",
    "num_addons",
    "has_fiber",
    "auto_payment",
    "has_streaming",
    "SeniorCitizen",
];
