mod test_peers_connect_through_relay;
mod test_relay_drop_renegotiates;
