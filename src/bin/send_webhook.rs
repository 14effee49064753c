use reqwest::Client;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:3000/api/webhooks/transfer".to_string());

    // One USDC deposit of 5.0 to the receiver in topics[2]
    let payload = json!({
        "webhookId": "wh_local_test",
        "id": "whevt_local_test",
        "createdAt": "2024-06-01T12:00:00.000Z",
        "type": "GRAPHQL",
        "event": {
            "data": {
                "block": {
                    "logs": [
                        {
                            "account": { "address": "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238" },
                            "topics": [
                                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                                "0x0000000000000000000000001111111111111111111111111111111111111111",
                                "0x0000000000000000000000002222222222222222222222222222222222222222"
                            ],
                            "data": "0x00000000000000000000000000000000000000000000000000000000004c4b40",
                            "transaction": {
                                "hash": "0x6c9bd8b0a7cb425bbb1b1ad4e34c32d87198a7ec7a2a87238eeaba9d24d05e6c",
                                "from": { "address": "0x1111111111111111111111111111111111111111" },
                                "to": { "address": "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238" },
                                "status": 1
                            }
                        }
                    ]
                }
            }
        }
    });

    let client = Client::new();
    let response = client.post(&endpoint).json(&payload).send().await?;

    println!("Status = {}", response.status());
    println!("Body = {}", response.text().await?);

    Ok(())
}
