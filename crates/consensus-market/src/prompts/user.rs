//! User message templates

/// Per-timeframe opinion request
pub const OPINION_USER: &str = r#"Analyze the {{ symbol }} ({{ contract }}) futures market for the {{ timeframe }} timeframe and predict the move over the {{ horizon }}.

Chart data:
{{ chart }}

Sentiment data:
{{ sentiment }}

Provide:
1. A technical analysis of the chart data
2. An analysis of the market sentiment
3. A clear prediction (Buy, Sell, or Hold)
4. A confidence score (0-1) for your prediction
5. Key factors influencing your decision

Format your response as JSON with this structure:
{
  "timeframe": "{{ timeframe }}",
  "technical_analysis": "your technical analysis",
  "sentiment_analysis": "your sentiment analysis",
  "prediction_label": "Buy/Sell/Hold",
  "signal_strength": 0.0,
  "key_factors": ["factor1", "factor2"]
}

Only respond with valid JSON."#;

/// Sentiment classification request
pub const SENTIMENT_USER: &str = r#"Recent news relevant to {{ symbol }} ({{ contract }}):

{{ snippets }}

Classify the overall sentiment of these articles for {{ symbol }}.
Respond with JSON: {"label": "Positive|Negative|Neutral", "score": <number between -1 and 1>}"#;
