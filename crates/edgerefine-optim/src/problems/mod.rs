pub mod model_pose;
