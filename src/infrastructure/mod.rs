pub mod coinspot_client;
