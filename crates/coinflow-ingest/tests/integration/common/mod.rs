pub mod frames;
pub mod mock_ws;
