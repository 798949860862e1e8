pub mod jwt_circuit;
